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

//! Workflow execution state models.
//!
//! A [`WorkflowExecution`] row tracks one run of a declarative workflow:
//! its context (step results keyed by step id) and `current_step`, which
//! always means the **last completed** step index (-1 before any step has
//! run). Resume picks up at `current_step + 1`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::serde_utils::deserialize_thing_id;

/// Execution lifecycle. `completed` and `failed` are terminal; a row in a
/// terminal state is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One run of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    #[serde(deserialize_with = "deserialize_thing_id")]
    pub id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    /// Step results keyed by step id
    #[serde(default)]
    pub context: serde_json::Value,
    /// Index of the last completed step (-1 = none yet)
    pub current_step: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Audit record for a failed execution, written in the same transaction
/// that flips the execution to `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowFailure {
    pub workflow_id: String,
    pub failed_step: String,
    pub error_message: String,
    /// Context snapshot as of the failure
    #[serde(default)]
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Aggregated execution statistics for one workflow name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub workflow_name: String,
    pub window_days: u32,
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub running: u64,
    /// Mean wall-clock duration of completed runs, when any exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_duration_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Failed).unwrap(),
            "\"failed\""
        );
    }

    #[test]
    fn test_execution_round_trip() {
        let exec = WorkflowExecution {
            id: "wf_1".to_string(),
            workflow_name: "prospect_pipeline".to_string(),
            status: ExecutionStatus::Running,
            context: serde_json::json!({"discover": [1, 2, 3]}),
            current_step: 0,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };

        let json = serde_json::to_string(&exec).unwrap();
        let back: WorkflowExecution = serde_json::from_str(&json).unwrap();
        assert_eq!(back.current_step, 0);
        assert_eq!(back.context["discover"], serde_json::json!([1, 2, 3]));
    }
}
