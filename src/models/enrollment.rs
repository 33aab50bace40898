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

//! Enrollment model: one contact's journey through one campaign instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::serde_utils::deserialize_thing_id;
use super::{Channel, EventType};

/// Enrollment lifecycle.
///
/// Terminal states (`completed`, `bounced`, `unsubscribed`) are reached
/// either by finishing the sequence or by a telemetry-driven transition in
/// the event pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    #[default]
    Active,
    Paused,
    Completed,
    Bounced,
    Unsubscribed,
}

impl EnrollmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EnrollmentStatus::Completed | EnrollmentStatus::Bounced | EnrollmentStatus::Unsubscribed
        )
    }

    /// The status an inbound telemetry event forces, if any.
    ///
    /// bounced -> bounced, unsubscribed -> unsubscribed, replied ->
    /// completed (a reply ends the sequence for that contact).
    pub fn from_event(event_type: EventType) -> Option<EnrollmentStatus> {
        match event_type {
            EventType::Bounced => Some(EnrollmentStatus::Bounced),
            EventType::Unsubscribed => Some(EnrollmentStatus::Unsubscribed),
            EventType::Replied => Some(EnrollmentStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrollmentStatus::Active => write!(f, "active"),
            EnrollmentStatus::Paused => write!(f, "paused"),
            EnrollmentStatus::Completed => write!(f, "completed"),
            EnrollmentStatus::Bounced => write!(f, "bounced"),
            EnrollmentStatus::Unsubscribed => write!(f, "unsubscribed"),
        }
    }
}

/// One contact enrolled in one campaign instance.
///
/// `provider_message_id` is written when the first outbound action is
/// dispatched; it is the correlation key webhooks use to find their way
/// back. Unique per channel once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignEnrollment {
    #[serde(deserialize_with = "deserialize_thing_id")]
    pub id: String,
    pub instance_id: String,
    pub contact_email: String,
    /// Opaque contact metadata (name, company, custom fields)
    #[serde(default)]
    pub contact: serde_json::Value,
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    pub current_step: u32,
    pub status: EnrollmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_driven_transitions() {
        assert_eq!(
            EnrollmentStatus::from_event(EventType::Bounced),
            Some(EnrollmentStatus::Bounced)
        );
        assert_eq!(
            EnrollmentStatus::from_event(EventType::Unsubscribed),
            Some(EnrollmentStatus::Unsubscribed)
        );
        assert_eq!(
            EnrollmentStatus::from_event(EventType::Replied),
            Some(EnrollmentStatus::Completed)
        );
        assert_eq!(EnrollmentStatus::from_event(EventType::Opened), None);
        assert_eq!(EnrollmentStatus::from_event(EventType::Delivered), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(EnrollmentStatus::Completed.is_terminal());
        assert!(EnrollmentStatus::Bounced.is_terminal());
        assert!(EnrollmentStatus::Unsubscribed.is_terminal());
        assert!(!EnrollmentStatus::Active.is_terminal());
        assert!(!EnrollmentStatus::Paused.is_terminal());
    }

    #[test]
    fn test_serialization_shape() {
        let enrollment = CampaignEnrollment {
            id: "enr_1".to_string(),
            instance_id: "inst_1".to_string(),
            contact_email: "ada@example.com".to_string(),
            contact: serde_json::json!({"first_name": "Ada"}),
            channel: Channel::Email,
            provider_message_id: Some("msg_9".to_string()),
            current_step: 2,
            status: EnrollmentStatus::Active,
            next_action_at: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&enrollment).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["channel"], "email");
        assert_eq!(json["provider_message_id"], "msg_9");
    }
}
