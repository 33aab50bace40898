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

//! Workflow state persistence.
//!
//! Terminal statuses are monotone: every mutation is guarded by
//! `WHERE status = 'running'`, so a completed or failed execution is never
//! touched again. Failure is a single transaction that flips the status
//! and writes the `workflow_failure` audit row together.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::db::{queries, DBClient};
use crate::models::{ExecutionStatus, WorkflowExecution, WorkflowFailure, WorkflowStats};

/// What `resume` hands back: the persisted context and the last completed
/// step. The caller re-enters the definition at `last_step + 1`.
#[derive(Debug, Clone)]
pub struct ResumePoint {
    pub context: serde_json::Value,
    pub last_step: i64,
}

/// Store for workflow executions and failure audit rows.
pub struct WorkflowStateStore {
    db: Arc<DBClient>,
}

impl WorkflowStateStore {
    pub fn new(db: Arc<DBClient>) -> Self {
        Self { db }
    }

    /// Inserts a `running` execution row. Idempotent on id: re-inserting
    /// an existing execution is a no-op.
    #[instrument(name = "wf_store_insert", skip(self), fields(execution_id = %id, workflow = %name))]
    pub async fn insert_running(&self, id: &str, name: &str) -> anyhow::Result<()> {
        let result = self
            .db
            .create(
                "workflow_execution",
                id,
                serde_json::json!({
                    "workflow_name": name,
                    "status": ExecutionStatus::Running,
                    "context": {},
                    "current_step": -1,
                }),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("already exists") => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Persists the context and last completed step after a successful
    /// step.
    pub async fn update_progress(
        &self,
        id: &str,
        last_step: i64,
        context: &serde_json::Value,
    ) -> anyhow::Result<()> {
        self.db
            .execute_with_params(
                "UPDATE type::thing('workflow_execution', $id) \
                 SET context = $context, current_step = $step \
                 WHERE status = 'running'",
                vec![
                    ("id".to_string(), serde_json::json!(id)),
                    ("context".to_string(), context.clone()),
                    ("step".to_string(), serde_json::json!(last_step)),
                ],
            )
            .await
    }

    /// Flips a running execution to `completed` with its final context.
    #[instrument(name = "wf_store_complete", skip(self, context), fields(execution_id = %id))]
    pub async fn mark_completed(
        &self,
        id: &str,
        last_step: i64,
        context: &serde_json::Value,
    ) -> anyhow::Result<()> {
        self.db
            .execute_with_params(
                "UPDATE type::thing('workflow_execution', $id) \
                 SET status = 'completed', context = $context, current_step = $step, \
                     completed_at = time::now() \
                 WHERE status = 'running'",
                vec![
                    ("id".to_string(), serde_json::json!(id)),
                    ("context".to_string(), context.clone()),
                    ("step".to_string(), serde_json::json!(last_step)),
                ],
            )
            .await?;
        info!("Execution completed");
        Ok(())
    }

    /// Atomically flips a running execution to `failed` and writes the
    /// failure audit row carrying the failed step and context snapshot.
    #[instrument(name = "wf_store_fail", skip(self, context), fields(execution_id = %id, failed_step = %failed_step))]
    pub async fn mark_failed(
        &self,
        id: &str,
        failed_step: &str,
        error_message: &str,
        context: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let script = "\
            BEGIN TRANSACTION;\n\
            UPDATE type::thing('workflow_execution', $id) \
                SET status = 'failed', error = $error, completed_at = time::now() \
                WHERE status = 'running';\n\
            CREATE type::thing('workflow_failure', $failure_id) CONTENT { \
                workflow_id: $id, \
                failed_step: $failed_step, \
                error_message: $error, \
                context: $context \
            };\n\
            COMMIT TRANSACTION;";

        self.db
            .transaction(
                script,
                vec![
                    ("id".to_string(), serde_json::json!(id)),
                    (
                        "failure_id".to_string(),
                        serde_json::json!(uuid::Uuid::new_v4().to_string()),
                    ),
                    ("failed_step".to_string(), serde_json::json!(failed_step)),
                    ("error".to_string(), serde_json::json!(error_message)),
                    ("context".to_string(), context.clone()),
                ],
            )
            .await?;
        warn!("Execution failed; failure row written");
        Ok(())
    }

    /// Loads one execution.
    pub async fn get(&self, id: &str) -> anyhow::Result<Option<WorkflowExecution>> {
        let rows = self
            .db
            .query_json_with_params(
                &format!(
                    "{} WHERE meta::id(id) = $id",
                    queries::workflow::SELECT_BASE
                ),
                vec![("id".to_string(), serde_json::json!(id))],
            )
            .await?;

        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| anyhow::anyhow!("execution deserialization failed: {}", e))
    }

    /// Resume data for a non-completed execution.
    pub async fn resume(&self, id: &str) -> anyhow::Result<Option<ResumePoint>> {
        Ok(self.get(id).await?.and_then(|execution| {
            if execution.status == ExecutionStatus::Completed {
                None
            } else {
                Some(ResumePoint {
                    context: execution.context,
                    last_step: execution.current_step,
                })
            }
        }))
    }

    /// Removes completed executions older than `days`. The retention
    /// window is clamped to the contract bound [1, 365] by the engine
    /// before this is called.
    #[instrument(name = "wf_store_cleanup", skip(self))]
    pub async fn cleanup_completed_before(&self, days: u32) -> anyhow::Result<u64> {
        let rows = self
            .db
            .query_json(&format!(
                "SELECT count() AS n FROM workflow_execution \
                 WHERE status = 'completed' AND started_at < time::now() - {}d GROUP ALL",
                days
            ))
            .await?;
        let count = rows.first().and_then(|row| row["n"].as_u64()).unwrap_or(0);

        self.db
            .execute(&format!(
                "DELETE workflow_execution \
                 WHERE status = 'completed' AND started_at < time::now() - {}d",
                days
            ))
            .await?;

        info!(removed = count, days, "Old workflow executions removed");
        Ok(count)
    }

    /// All failure audit rows for one execution, newest first.
    pub async fn failures(&self, workflow_id: &str) -> anyhow::Result<Vec<WorkflowFailure>> {
        let rows = self
            .db
            .query_json_with_params(
                "SELECT workflow_id, failed_step, error_message, context, created_at \
                 FROM workflow_failure WHERE workflow_id = $id ORDER BY created_at DESC",
                vec![("id".to_string(), serde_json::json!(workflow_id))],
            )
            .await?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<WorkflowFailure>, _>>()
            .map_err(|e| anyhow::anyhow!("failure row deserialization failed: {}", e))
    }

    /// Execution statistics for one workflow name over a trailing window.
    ///
    /// Status counts and mean duration are separate queries: running rows
    /// have no `completed_at`, so the duration aggregate only ranges over
    /// completed executions.
    #[instrument(name = "wf_store_stats", skip(self), fields(workflow = %name))]
    pub async fn stats(&self, name: &str, days: u32) -> anyhow::Result<WorkflowStats> {
        let count_rows = self
            .db
            .query_json_with_params(
                &format!(
                    "SELECT status, count() AS n FROM workflow_execution \
                     WHERE workflow_name = $name AND started_at > time::now() - {}d \
                     GROUP BY status",
                    days
                ),
                vec![("name".to_string(), serde_json::json!(name))],
            )
            .await?;

        let mut stats = WorkflowStats {
            workflow_name: name.to_string(),
            window_days: days,
            total: 0,
            completed: 0,
            failed: 0,
            running: 0,
            avg_duration_ms: None,
        };

        for row in count_rows {
            let count = row["n"].as_u64().unwrap_or(0);
            stats.total += count;
            match row["status"].as_str() {
                Some("completed") => stats.completed = count,
                Some("failed") => stats.failed = count,
                Some("running") => stats.running = count,
                _ => {}
            }
        }

        if stats.completed > 0 {
            let duration_rows = self
                .db
                .query_json_with_params(
                    &format!(
                        "SELECT math::mean(duration::millis(completed_at - started_at)) AS avg_ms \
                         FROM workflow_execution \
                         WHERE workflow_name = $name AND status = 'completed' \
                           AND started_at > time::now() - {}d \
                         GROUP ALL",
                        days
                    ),
                    vec![("name".to_string(), serde_json::json!(name))],
                )
                .await?;
            stats.avg_duration_ms = duration_rows
                .first()
                .and_then(|row| row["avg_ms"].as_f64())
                .map(|ms| ms as u64);
        }

        Ok(stats)
    }
}
