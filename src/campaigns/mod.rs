// Copyright 2025 Cadence Labs
// SPDX-License-Identifier: Apache-2.0

//! Campaign persistence: templates, instances, enrollments.

pub mod store;

pub use store::{CampaignStore, StoreError};
