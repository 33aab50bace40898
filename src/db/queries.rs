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

//! Centralized query constants.
//!
//! SELECT templates project `meta::id(id) AS id` so record ids reach the
//! model layer as plain strings, and keep field selection consistent across
//! call sites.

/// Campaign instance queries.
pub mod instance {
    /// Base SELECT for instances; append `WHERE` clauses as needed.
    pub const SELECT_BASE: &str = r#"SELECT
        meta::id(id) AS id,
        template_id,
        owner_id,
        name,
        status,
        provider,
        total_sent,
        total_delivered,
        total_opened,
        total_clicked,
        total_replied,
        total_bounced,
        total_unsubscribed,
        total_errored,
        started_at,
        paused_at,
        completed_at,
        created_at
    FROM campaign_instance"#;
}

/// Enrollment queries.
pub mod enrollment {
    /// Base SELECT for enrollments.
    pub const SELECT_BASE: &str = r#"SELECT
        meta::id(id) AS id,
        instance_id,
        contact_email,
        contact,
        channel,
        provider_message_id,
        current_step,
        status,
        next_action_at,
        created_at
    FROM campaign_enrollment"#;

    /// Lookup by correlation key. Bind `$channel` and `$message_id`.
    pub const BY_MESSAGE: &str = r#"SELECT
        meta::id(id) AS id,
        instance_id,
        contact_email,
        contact,
        channel,
        provider_message_id,
        current_step,
        status,
        next_action_at,
        created_at
    FROM campaign_enrollment
    WHERE channel = $channel AND provider_message_id = $message_id
    LIMIT 1"#;
}

/// Campaign event queries.
pub mod event {
    /// Base SELECT for telemetry events.
    pub const SELECT_BASE: &str = r#"SELECT
        meta::id(id) AS id,
        enrollment_id,
        instance_id,
        event_type,
        channel,
        provider,
        provider_event_id,
        timestamp,
        step_number,
        metadata
    FROM campaign_event"#;
}

/// Orphaned-event queue queries.
pub mod orphan {
    /// Entries whose visibility timestamp has passed, oldest first.
    pub const SELECT_DUE: &str = r#"SELECT
        meta::id(id) AS id,
        event,
        retry_count,
        due_at,
        created_at
    FROM orphaned_event
    WHERE due_at <= time::now()
    ORDER BY due_at ASC"#;

    /// Count of all pending entries (due or not).
    pub const COUNT_PENDING: &str =
        "SELECT count() AS pending FROM orphaned_event GROUP ALL";
}

/// Dead-letter queue queries.
pub mod dlq {
    /// Base SELECT for dead-letter rows.
    pub const SELECT_BASE: &str = r#"SELECT
        meta::id(id) AS id,
        provider,
        payload,
        signature,
        failure_reason,
        status,
        created_at,
        replayed_at
    FROM dead_letter_event"#;
}

/// Workflow execution queries.
pub mod workflow {
    /// Base SELECT for executions.
    pub const SELECT_BASE: &str = r#"SELECT
        meta::id(id) AS id,
        workflow_name,
        status,
        context,
        current_step,
        error,
        started_at,
        completed_at
    FROM workflow_execution"#;
}
