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

//! # Workflow Engine
//!
//! Declarative prospect pipelines (discovery -> enrichment -> scoring ->
//! segmentation -> campaign setup) executed step by step with persistent
//! state:
//!
//! - [`definition`] - serde document format and validation
//! - [`engine`] - sequential execution, input reference resolution
//! - [`store`] - execution/failure persistence, resume, retention, stats

pub mod definition;
pub mod engine;
pub mod store;

pub use definition::{DefinitionError, StepDefinition, WorkflowDefinition};
pub use engine::{WorkflowEngine, WorkflowError, WorkflowOutcome};
pub use store::{ResumePoint, WorkflowStateStore};
