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

//! Tool registry: action dispatch with safety gates.
//!
//! Workflow steps reference actions by name; this registry is the single
//! call site into the functions behind those names, and the only place the
//! safety policy lives. Destructive actions pass an approval gate sized by
//! the inferred batch: up to 10 silently, up to 50 with an audit log entry,
//! beyond 50 only with a previously granted approval. There is no bypass
//! path.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Auto-approve ceiling for destructive batches.
const AUTO_APPROVE_LIMIT: usize = 10;
/// Interim safety ceiling: auto-approved but audited.
const AUDITED_APPROVE_LIMIT: usize = 50;

/// Outcome of a tool invocation.
pub type ToolResult = Result<serde_json::Value, ToolError>;
/// Boxed future returned by registered functions.
pub type ToolFuture = BoxFuture<'static, ToolResult>;
/// A registered, executable action.
pub type ToolFn = Arc<dyn Fn(serde_json::Value) -> ToolFuture + Send + Sync>;

/// Whether an action mutates external state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    ReadOnly,
    Destructive,
}

/// Safety metadata attached at registration time.
#[derive(Debug, Clone)]
pub struct ToolMetadata {
    pub tool_type: ToolType,
    /// Largest batch the function may receive
    pub batch_limit: Option<usize>,
    /// Whether destructive dispatches go through the approval gate
    pub requires_approval: bool,
}

impl ToolMetadata {
    /// Read-only action: no gate, no approval.
    pub fn read_only() -> Self {
        Self {
            tool_type: ToolType::ReadOnly,
            batch_limit: None,
            requires_approval: false,
        }
    }

    /// Destructive action: approval required by default.
    pub fn destructive() -> Self {
        Self {
            tool_type: ToolType::Destructive,
            batch_limit: None,
            requires_approval: true,
        }
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = Some(limit);
        self
    }

    pub fn without_approval(mut self) -> Self {
        self.requires_approval = false;
        self
    }
}

/// Approval lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
}

/// A pending (or granted) approval record.
#[derive(Debug, Clone, Serialize)]
pub struct PendingApproval {
    pub action: String,
    pub batch_size: usize,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

/// Tool dispatch failures.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("batch of {actual} exceeds limit of {limit} for action '{action}'")]
    BatchLimitExceeded {
        action: String,
        actual: usize,
        limit: usize,
    },

    #[error("action '{action}' with batch of {batch_size} requires approval; pending approval id: {approval_id}")]
    ApprovalRequired {
        action: String,
        approval_id: String,
        batch_size: usize,
    },

    #[error("approval {approval_id} is still pending")]
    ApprovalPending { approval_id: String },

    #[error("approval {0} not found")]
    ApprovalNotFound(String),

    #[error("action '{action}' failed: {message}")]
    ExecutionFailed { action: String, message: String },
}

struct RegisteredTool {
    metadata: ToolMetadata,
    func: ToolFn,
}

/// Registry mapping action names to functions, with safety enforcement on
/// every dispatch.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, RegisteredTool>>,
    /// Mutated only by the registry itself
    pending_approvals: Mutex<HashMap<String, PendingApproval>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            pending_approvals: Mutex::new(HashMap::new()),
        }
    }

    /// Registers an action. Re-registering a name replaces the previous
    /// function (used by tests and config reloads).
    #[instrument(name = "tool_register", skip(self, func, metadata), fields(action = %name))]
    pub async fn register<F, Fut>(&self, name: &str, metadata: ToolMetadata, func: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ToolResult> + Send + 'static,
    {
        debug!(tool_type = ?metadata.tool_type, batch_limit = ?metadata.batch_limit, "Registering tool");
        let func: ToolFn = Arc::new(move |inputs| {
            let fut: ToolFuture = Box::pin(func(inputs));
            fut
        });
        self.tools
            .write()
            .await
            .insert(name.to_string(), RegisteredTool { metadata, func });
    }

    /// Whether an action is registered.
    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// All registered action names.
    pub async fn action_names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    /// Derives the batch size from the inputs.
    ///
    /// Precedence: `auto_approve_list` + `review_queue`, else `contacts`,
    /// else `leads`, else 1.
    pub fn infer_batch_size(inputs: &serde_json::Value) -> usize {
        let len_of = |key: &str| inputs[key].as_array().map(|a| a.len());

        let auto = len_of("auto_approve_list");
        let review = len_of("review_queue");
        if auto.is_some() || review.is_some() {
            return auto.unwrap_or(0) + review.unwrap_or(0);
        }
        if let Some(contacts) = len_of("contacts") {
            return contacts;
        }
        if let Some(leads) = len_of("leads") {
            return leads;
        }
        1
    }

    /// Dispatches an action with the full safety policy applied.
    #[instrument(name = "tool_execute", skip(self, inputs), fields(action = %name))]
    pub async fn execute(
        &self,
        name: &str,
        inputs: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let tools = self.tools.read().await;
        let tool = tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownAction(name.to_string()))?;
        let metadata = tool.metadata.clone();
        let func = tool.func.clone();
        drop(tools);

        let batch_size = Self::infer_batch_size(&inputs);

        if let Some(limit) = metadata.batch_limit {
            if batch_size > limit {
                warn!(batch_size, limit, "Batch limit exceeded");
                return Err(ToolError::BatchLimitExceeded {
                    action: name.to_string(),
                    actual: batch_size,
                    limit,
                });
            }
        }

        if metadata.tool_type == ToolType::Destructive && metadata.requires_approval {
            self.enforce_approval_gate(name, &inputs, batch_size).await?;
        }

        debug!(batch_size, "Dispatching tool");
        func(inputs).await
    }

    /// The approval gate for destructive dispatches.
    ///
    /// <= 10: auto-approve. <= 50: auto-approve with an audit entry.
    /// > 50: only with a granted approval id; otherwise a pending record is
    /// created and the dispatch fails carrying its id.
    async fn enforce_approval_gate(
        &self,
        action: &str,
        inputs: &serde_json::Value,
        batch_size: usize,
    ) -> Result<(), ToolError> {
        if batch_size <= AUTO_APPROVE_LIMIT {
            return Ok(());
        }

        if batch_size <= AUDITED_APPROVE_LIMIT {
            info!(
                action = %action,
                batch_size,
                "AUDIT: destructive batch auto-approved under interim ceiling"
            );
            return Ok(());
        }

        let mut approvals = self.pending_approvals.lock().await;

        if let Some(approval_id) = inputs["approval_id"].as_str() {
            return match approvals.get(approval_id) {
                Some(record) if record.action == action => match record.status {
                    ApprovalStatus::Approved => {
                        // Consume: one approval authorizes one dispatch.
                        approvals.remove(approval_id);
                        info!(approval_id = %approval_id, "Approved dispatch proceeding");
                        Ok(())
                    }
                    ApprovalStatus::Pending => Err(ToolError::ApprovalPending {
                        approval_id: approval_id.to_string(),
                    }),
                },
                Some(_) => Err(ToolError::ApprovalNotFound(approval_id.to_string())),
                None => Err(ToolError::ApprovalNotFound(approval_id.to_string())),
            };
        }

        // Ids are `<action>_<unix_ms>`. Concurrent dispatches can land in
        // the same millisecond, and an insert must never clobber another
        // caller's record, so bump the stamp until the key is free (the
        // approvals mutex is held, making the probe-then-insert atomic).
        let mut stamp = Utc::now().timestamp_millis();
        let mut approval_id = format!("{}_{}", action, stamp);
        while approvals.contains_key(&approval_id) {
            stamp += 1;
            approval_id = format!("{}_{}", action, stamp);
        }
        approvals.insert(
            approval_id.clone(),
            PendingApproval {
                action: action.to_string(),
                batch_size,
                status: ApprovalStatus::Pending,
                created_at: Utc::now(),
            },
        );
        warn!(
            approval_id = %approval_id,
            batch_size,
            "Destructive batch exceeds approval ceiling; pending approval created"
        );

        Err(ToolError::ApprovalRequired {
            action: action.to_string(),
            approval_id,
            batch_size,
        })
    }

    /// Grants a pending approval.
    pub async fn approve(&self, approval_id: &str) -> Result<(), ToolError> {
        let mut approvals = self.pending_approvals.lock().await;
        match approvals.get_mut(approval_id) {
            Some(record) => {
                record.status = ApprovalStatus::Approved;
                info!(approval_id = %approval_id, "Approval granted");
                Ok(())
            }
            None => Err(ToolError::ApprovalNotFound(approval_id.to_string())),
        }
    }

    /// Snapshot of the approvals map (admin surface).
    pub async fn pending_approvals(&self) -> Vec<(String, PendingApproval)> {
        self.pending_approvals
            .lock()
            .await
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
