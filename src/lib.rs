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

//! # Cadence Core
//!
//! Backend core of the Cadence sales outreach platform: campaign event
//! ingestion, workflow orchestration and provider access. The HTTP layer,
//! auth and UI live elsewhere and consume this crate.
//!
//! ## Modules
//!
//! - [`events`] - webhook event pipeline, orphaned-event queue, dead letters
//! - [`campaigns`] - templates, instances, enrollments
//! - [`workflow`] - declarative step workflows with persistent state
//! - [`tools`] - action registry with safety gates
//! - [`providers`] - capability-scoped provider clients behind a caching
//!   factory, with circuit breaking and retry
//! - [`db`] - embedded SurrealDB client and schema
//! - [`models`] - shared entities
//! - [`security`] - input validation and webhook signatures
//! - [`config`] - environment-resolved configuration
//! - [`state`] - application wiring
//!
//! ## Example
//!
//! ```rust,ignore
//! use cadence_core::{AppConfig, AppState};
//!
//! let state = AppState::new(AppConfig::from_env()).await?;
//! state.start().await;
//!
//! // Hand webhooks to the pipeline from the HTTP layer:
//! let receipt = state.pipeline
//!     .ingest_webhook(provider, &raw_body, &headers)
//!     .await?;
//! ```

pub mod campaigns;
pub mod config;
pub mod db;
pub mod events;
pub mod models;
pub mod providers;
pub mod security;
pub mod state;
pub mod tools;
pub mod workflow;

pub use config::AppConfig;
pub use state::AppState;
