// Copyright 2025 Cadence Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Workflow engine.
//!
//! Executes declarative workflows strictly sequentially: resolve each
//! step's inputs against the accumulated context, dispatch through the
//! tool registry, persist progress. State persistence is best-effort for a
//! single run (a dead database does not stop a workflow mid-flight) but a
//! step failure is authoritative: the execution flips to `failed`, a
//! failure row is written, and no further steps run.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::security::{ValidationError, Validator};
use crate::tools::{ToolError, ToolRegistry};

use super::definition::{DefinitionError, WorkflowDefinition};
use super::store::{ResumePoint, WorkflowStateStore};

/// Reference prefix for step-result inputs.
const REF_PREFIX: &str = "from_";
/// Sentinel resolving to the whole previous step result.
const PREVIOUS_STEP_REF: &str = "from_previous_step";

/// Retention window bounds for cleanup, in days.
const MIN_RETENTION_DAYS: u32 = 1;
const MAX_RETENTION_DAYS: u32 = 365;

/// Workflow engine failures.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid definition: {0}")]
    Definition(#[from] DefinitionError),

    #[error("invalid workflow name: {0}")]
    Validation(#[from] ValidationError),

    #[error("step '{step_id}' failed: {source}")]
    StepFailed {
        step_id: String,
        #[source]
        source: ToolError,
    },

    #[error("execution {0} not found")]
    NotFound(String),

    #[error("execution {0} already completed; nothing to resume")]
    AlreadyCompleted(String),

    #[error("retention days {0} outside allowed range [1, 365]")]
    InvalidRetention(u32),

    #[error("state store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Result of a completed run.
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub execution_id: String,
    /// Step results keyed by step id
    pub context: serde_json::Value,
}

/// The workflow engine. One engine serves many concurrent workflows; each
/// run's steps are strictly sequential.
pub struct WorkflowEngine {
    store: Arc<WorkflowStateStore>,
    tools: Arc<ToolRegistry>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<WorkflowStateStore>, tools: Arc<ToolRegistry>) -> Self {
        Self { store, tools }
    }

    /// Runs a workflow definition to completion (or first failure).
    #[instrument(name = "workflow_execute", skip(self, definition), fields(workflow = %name))]
    pub async fn execute(
        &self,
        name: &str,
        definition: &WorkflowDefinition,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let name = Validator::validate_workflow_name(name)?;
        definition.validate()?;

        let execution_id = Uuid::new_v4().to_string();
        self.run(&execution_id, &name, definition, serde_json::Map::new(), 0)
            .await
    }

    /// Resumes a non-completed execution from its persisted context,
    /// re-entering the definition at `last_step + 1`.
    #[instrument(name = "workflow_resume_run", skip(self, definition), fields(execution_id = %execution_id))]
    pub async fn resume_execution(
        &self,
        execution_id: &str,
        name: &str,
        definition: &WorkflowDefinition,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let point = self.resume(execution_id).await?;
        let context = match point.context {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let next_step = (point.last_step + 1).max(0) as usize;

        info!(next_step, "Resuming execution");
        self.run(execution_id, name, definition, context, next_step)
            .await
    }

    async fn run(
        &self,
        execution_id: &str,
        name: &str,
        definition: &WorkflowDefinition,
        mut context: serde_json::Map<String, serde_json::Value>,
        first_step: usize,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        // Durability is best-effort for single-run completion: a failed
        // insert is logged and execution continues.
        if let Err(e) = self.store.insert_running(execution_id, name).await {
            warn!(error = %e, "Failed to persist execution start; continuing");
        }

        let steps = definition.steps();
        let mut previous_step_id =
            first_step.checked_sub(1).map(|index| steps[index].id.clone());

        for (index, step) in steps.iter().enumerate().skip(first_step) {
            let inputs = resolve_inputs(
                &serde_json::Value::Object(step.inputs.clone()),
                &context,
                previous_step_id.as_deref(),
            );

            debug!(step_id = %step.id, action = %step.action, "Dispatching step");
            match self.tools.execute(&step.action, inputs).await {
                Ok(result) => {
                    context.insert(step.id.clone(), result);
                    let snapshot = serde_json::Value::Object(context.clone());
                    if let Err(e) = self
                        .store
                        .update_progress(execution_id, index as i64, &snapshot)
                        .await
                    {
                        warn!(error = %e, step_id = %step.id, "Failed to persist progress; continuing");
                    }
                    previous_step_id = Some(step.id.clone());
                }
                Err(source) => {
                    error!(step_id = %step.id, error = %source, "Step failed; aborting execution");
                    let snapshot = serde_json::Value::Object(context.clone());
                    if let Err(e) = self
                        .store
                        .mark_failed(execution_id, &step.id, &source.to_string(), &snapshot)
                        .await
                    {
                        error!(error = %e, "Failed to persist workflow failure");
                    }
                    return Err(WorkflowError::StepFailed {
                        step_id: step.id.clone(),
                        source,
                    });
                }
            }
        }

        let final_context = serde_json::Value::Object(context);
        if let Err(e) = self
            .store
            .mark_completed(execution_id, steps.len() as i64 - 1, &final_context)
            .await
        {
            warn!(error = %e, "Failed to persist completion");
        }

        info!(steps = steps.len(), "Workflow completed");
        Ok(WorkflowOutcome {
            execution_id: execution_id.to_string(),
            context: final_context,
        })
    }

    /// Resume data for a non-completed execution: `{context, last_step}`.
    /// The engine does not auto-resume on restart; dispatch is the
    /// caller's move.
    pub async fn resume(&self, execution_id: &str) -> Result<ResumePoint, WorkflowError> {
        match self.store.get(execution_id).await? {
            None => Err(WorkflowError::NotFound(execution_id.to_string())),
            Some(execution) if execution.status == crate::models::ExecutionStatus::Completed => {
                Err(WorkflowError::AlreadyCompleted(execution_id.to_string()))
            }
            Some(execution) => Ok(ResumePoint {
                context: execution.context,
                last_step: execution.current_step,
            }),
        }
    }

    /// Removes completed executions older than `days`, bounded [1, 365].
    pub async fn cleanup_old_workflows(&self, days: u32) -> Result<u64, WorkflowError> {
        if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&days) {
            return Err(WorkflowError::InvalidRetention(days));
        }
        Ok(self.store.cleanup_completed_before(days).await?)
    }

    /// Execution statistics (admin surface).
    pub async fn stats(
        &self,
        name: &str,
        days: u32,
    ) -> Result<crate::models::WorkflowStats, WorkflowError> {
        Ok(self.store.stats(name, days).await?)
    }
}

/// Resolves one step's inputs against the context.
///
/// - literals pass through unchanged
/// - `from_previous_step` resolves to the whole previous result
/// - `from_<step-id>` resolves to that step's result
/// - `from_<step-id>.<path>` walks a dotted path, producing `null` for
///   missing keys rather than failing
/// - objects and arrays resolve recursively
fn resolve_inputs(
    value: &serde_json::Value,
    context: &serde_json::Map<String, serde_json::Value>,
    previous_step_id: Option<&str>,
) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => {
            if s == PREVIOUS_STEP_REF {
                return previous_step_id
                    .and_then(|id| context.get(id))
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
            }
            if let Some(reference) = s.strip_prefix(REF_PREFIX) {
                let (step_id, path) = match reference.split_once('.') {
                    Some((step_id, path)) => (step_id, Some(path)),
                    None => (reference, None),
                };
                let base = context
                    .get(step_id)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                return match path {
                    Some(path) => walk_path(&base, path),
                    None => base,
                };
            }
            value.clone()
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    (
                        key.clone(),
                        resolve_inputs(inner, context, previous_step_id),
                    )
                })
                .collect(),
        ),
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|inner| resolve_inputs(inner, context, previous_step_id))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn walk_path(value: &serde_json::Value, path: &str) -> serde_json::Value {
    let mut current = value.clone();
    for segment in path.split('.') {
        current = match current {
            serde_json::Value::Object(mut map) => {
                map.remove(segment).unwrap_or(serde_json::Value::Null)
            }
            serde_json::Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index).cloned())
                .unwrap_or(serde_json::Value::Null),
            _ => serde_json::Value::Null,
        };
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve(
        inputs: serde_json::Value,
        context: &serde_json::Map<String, serde_json::Value>,
        previous: Option<&str>,
    ) -> serde_json::Value {
        resolve_inputs(&inputs, context, previous)
    }

    fn context() -> serde_json::Map<String, serde_json::Value> {
        let mut context = serde_json::Map::new();
        context.insert("discover".to_string(), json!([1, 2, 3]));
        context.insert(
            "enrich".to_string(),
            json!({"contacts": [{"email": "ada@example.com"}], "count": 1}),
        );
        context
    }

    #[test]
    fn test_literals_pass_through() {
        let resolved = resolve(
            json!({"industry": "saas", "size": 50, "flag": true}),
            &context(),
            Some("enrich"),
        );
        assert_eq!(resolved, json!({"industry": "saas", "size": 50, "flag": true}));
    }

    #[test]
    fn test_from_previous_step() {
        let resolved = resolve(
            json!({"items": "from_previous_step"}),
            &context(),
            Some("discover"),
        );
        assert_eq!(resolved["items"], json!([1, 2, 3]));
    }

    #[test]
    fn test_from_named_step() {
        let resolved = resolve(json!({"data": "from_enrich"}), &context(), None);
        assert_eq!(resolved["data"]["count"], 1);
    }

    #[test]
    fn test_from_named_step_with_path() {
        let resolved = resolve(
            json!({"count": "from_enrich.count", "first": "from_enrich.contacts.0.email"}),
            &context(),
            None,
        );
        assert_eq!(resolved["count"], 1);
        assert_eq!(resolved["first"], "ada@example.com");
    }

    #[test]
    fn test_missing_path_produces_null() {
        let resolved = resolve(
            json!({"missing": "from_enrich.nope.deeper", "unknown": "from_ghost"}),
            &context(),
            None,
        );
        assert_eq!(resolved["missing"], serde_json::Value::Null);
        assert_eq!(resolved["unknown"], serde_json::Value::Null);
    }

    #[test]
    fn test_containers_resolve_recursively() {
        let resolved = resolve(
            json!({"nested": {"inner": "from_enrich.count"}, "list": ["from_discover", "literal"]}),
            &context(),
            None,
        );
        assert_eq!(resolved["nested"]["inner"], 1);
        assert_eq!(resolved["list"][0], json!([1, 2, 3]));
        assert_eq!(resolved["list"][1], "literal");
    }

    #[test]
    fn test_previous_step_without_predecessor() {
        let resolved = resolve(json!({"items": "from_previous_step"}), &context(), None);
        assert_eq!(resolved["items"], serde_json::Value::Null);
    }
}
