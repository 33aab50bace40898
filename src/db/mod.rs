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

//! # Database Module
//!
//! Embedded SurrealDB (RocksDB backend) persistence for Cadence Core.
//!
//! - [`DBClient`] - connection wrapper with query/mutation/transaction helpers
//! - [`schema`] - table definitions (campaigns, enrollments, events, queues,
//!   workflow state)
//! - [`queries`] - centralized SELECT constants

pub mod client;
pub mod queries;
pub mod schema;

pub use client::DBClient;
