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

//! # Campaign Event Pipeline
//!
//! Provider webhooks in, durable deduplicated counter state out:
//!
//! - [`pipeline`] - signature verification, normalization, atomic apply
//! - [`normalizer`] - per-provider payload schemas -> [`crate::models::NormalizedEvent`]
//! - [`orphan_queue`] - durable delayed retries for events that beat their
//!   enrollment's commit
//! - [`dlq`] - dead-letter administration (list / replay)

pub mod dlq;
pub mod normalizer;
pub mod orphan_queue;
pub mod pipeline;

pub use dlq::{DeadLetterStore, DlqFilter, ReplayReport};
pub use normalizer::NormalizeError;
pub use orphan_queue::{OrphanQueueConfig, OrphanedEventQueue, QueueHealth};
pub use pipeline::{EventPipeline, IngestReceipt, PipelineError};
