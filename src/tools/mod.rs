// Copyright 2025 Cadence Labs
// SPDX-License-Identifier: Apache-2.0

//! Tool registry: named actions with typed safety metadata.

pub mod registry;

pub use registry::{
    ApprovalStatus, PendingApproval, ToolError, ToolFn, ToolMetadata, ToolRegistry, ToolType,
};
