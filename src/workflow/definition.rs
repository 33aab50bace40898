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

//! Declarative workflow definitions.
//!
//! A definition document has one required top-level key, `workflow.steps`:
//! an ordered list of steps, each naming a registered action and its
//! inputs. Input values may be literals or references into earlier step
//! results (`from_previous_step`, `from_<step-id>`,
//! `from_<step-id>.<path>`); resolution lives in the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Definition parse/validation failures.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("definition is not valid JSON: {0}")]
    Parse(String),

    #[error("workflow has no steps")]
    NoSteps,

    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),

    #[error("step '{0}' has an empty action")]
    EmptyAction(String),
}

/// One step of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique within the workflow; keys the step's result in the context
    pub id: String,
    /// Advisory label for which agent/runner handles the step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Action name registered in the tool registry
    pub action: String,
    /// Literal values and `from_*` references
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
}

/// The `workflow` body of a definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowBody {
    pub steps: Vec<StepDefinition>,
}

/// A parsed workflow definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub workflow: WorkflowBody,
}

impl WorkflowDefinition {
    /// Parses a definition from its JSON document form.
    pub fn from_json(document: &str) -> Result<Self, DefinitionError> {
        let definition: WorkflowDefinition =
            serde_json::from_str(document).map_err(|e| DefinitionError::Parse(e.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Structural validation: at least one step, unique ids, non-empty
    /// actions.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.workflow.steps.is_empty() {
            return Err(DefinitionError::NoSteps);
        }

        let mut seen = HashSet::new();
        for step in &self.workflow.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(DefinitionError::DuplicateStepId(step.id.clone()));
            }
            if step.action.trim().is_empty() {
                return Err(DefinitionError::EmptyAction(step.id.clone()));
            }
        }
        Ok(())
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.workflow.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> String {
        json!({
            "workflow": {
                "steps": [
                    {"id": "discover", "agent": "prospector", "action": "search_leads",
                     "inputs": {"industry": "saas", "size": 50}},
                    {"id": "enrich", "action": "enrich_contacts",
                     "inputs": {"leads": "from_previous_step"}},
                    {"id": "score", "action": "score_leads",
                     "inputs": {"contacts": "from_enrich.contacts"}},
                ]
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_valid_definition() {
        let definition = WorkflowDefinition::from_json(&document()).unwrap();
        assert_eq!(definition.steps().len(), 3);
        assert_eq!(definition.steps()[0].id, "discover");
        assert_eq!(definition.steps()[0].agent.as_deref(), Some("prospector"));
        assert!(definition.steps()[1].agent.is_none());
    }

    #[test]
    fn test_rejects_empty_steps() {
        let err = WorkflowDefinition::from_json(r#"{"workflow": {"steps": []}}"#).unwrap_err();
        assert!(matches!(err, DefinitionError::NoSteps));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let doc = json!({
            "workflow": {"steps": [
                {"id": "a", "action": "x", "inputs": {}},
                {"id": "a", "action": "y", "inputs": {}},
            ]}
        })
        .to_string();
        let err = WorkflowDefinition::from_json(&doc).unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateStepId(_)));
    }

    #[test]
    fn test_rejects_empty_action() {
        let doc = json!({
            "workflow": {"steps": [{"id": "a", "action": "  ", "inputs": {}}]}
        })
        .to_string();
        let err = WorkflowDefinition::from_json(&doc).unwrap_err();
        assert!(matches!(err, DefinitionError::EmptyAction(_)));
    }

    #[test]
    fn test_rejects_missing_workflow_key() {
        let err = WorkflowDefinition::from_json(r#"{"steps": []}"#).unwrap_err();
        assert!(matches!(err, DefinitionError::Parse(_)));
    }
}
