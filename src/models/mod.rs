// Copyright 2025 Cadence Labs
// SPDX-License-Identifier: Apache-2.0

pub mod campaign;
pub mod enrollment;
pub mod event;
pub mod serde_utils;
pub mod workflow;

pub use campaign::{
    CampaignCounters, CampaignInstance, CampaignTemplate, CampaignType, InstanceStatus, PathType,
    TemplateStep,
};
pub use enrollment::{CampaignEnrollment, EnrollmentStatus};
pub use event::{
    CampaignEvent, Channel, DeadLetterEvent, DeadLetterStatus, EventType, NormalizedEvent,
    OrphanedEvent,
};
pub use workflow::{ExecutionStatus, WorkflowExecution, WorkflowFailure, WorkflowStats};
