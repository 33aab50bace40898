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

//! Campaign telemetry event models.
//!
//! A webhook payload from any provider is normalized into a single
//! [`NormalizedEvent`] shape before it touches the database. The persisted
//! form is [`CampaignEvent`], whose record id doubles as the deduplication
//! key: the provider-issued event id when one exists, otherwise a SHA-256
//! digest of (enrollment, event type, timestamp).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::serde_utils::deserialize_thing_id;

/// Outreach channel an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Linkedin,
    Video,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Linkedin => write!(f, "linkedin"),
            Channel::Video => write!(f, "video"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "linkedin" => Ok(Channel::Linkedin),
            "video" => Ok(Channel::Video),
            _ => Err(format!("Invalid channel: {}", s)),
        }
    }
}

/// Normalized event type across all providers.
///
/// The eight core variants each map to exactly one instance counter. The
/// video variants are provider callbacks from generation jobs;
/// `video_failed` rolls up into `total_errored`, `video_generated` has no
/// counter of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Replied,
    Bounced,
    Unsubscribed,
    Errored,
    VideoGenerated,
    VideoFailed,
}

impl EventType {
    /// The instance counter column this event type increments, if any.
    pub fn counter_field(&self) -> Option<&'static str> {
        match self {
            EventType::Sent => Some("total_sent"),
            EventType::Delivered => Some("total_delivered"),
            EventType::Opened => Some("total_opened"),
            EventType::Clicked => Some("total_clicked"),
            EventType::Replied => Some("total_replied"),
            EventType::Bounced => Some("total_bounced"),
            EventType::Unsubscribed => Some("total_unsubscribed"),
            EventType::Errored | EventType::VideoFailed => Some("total_errored"),
            EventType::VideoGenerated => None,
        }
    }

    /// Wire name used in serialized payloads and record ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Sent => "sent",
            EventType::Delivered => "delivered",
            EventType::Opened => "opened",
            EventType::Clicked => "clicked",
            EventType::Replied => "replied",
            EventType::Bounced => "bounced",
            EventType::Unsubscribed => "unsubscribed",
            EventType::Errored => "errored",
            EventType::VideoGenerated => "video_generated",
            EventType::VideoFailed => "video_failed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A provider webhook payload after normalization, before persistence.
///
/// `enrollment_id` and `instance_id` are filled in by the enrollment lookup;
/// an event that arrives before its enrollment exists carries only the
/// correlation key (`provider_message_id`) and goes to the orphan queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Provider-issued unique event token (primary dedup key when present)
    #[serde(default)]
    pub provider_event_id: Option<String>,
    /// Provider-issued id of the outbound message (correlation key)
    #[serde(default)]
    pub provider_message_id: Option<String>,
    /// Owning enrollment, once resolved
    #[serde(default)]
    pub enrollment_id: Option<String>,
    /// Owning campaign instance, once resolved
    #[serde(default)]
    pub instance_id: Option<String>,
    pub event_type: EventType,
    pub channel: Channel,
    /// Source provider tag (e.g. "lemlist")
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    /// Sequence step that produced the outbound message, when known
    #[serde(default)]
    pub step_number: Option<u32>,
    /// Opaque provider-specific remainder of the payload
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NormalizedEvent {
    /// Deterministic record id used for `findOrCreate` semantics.
    ///
    /// Provider event ids are used verbatim (scoped by provider to keep
    /// tokens from different providers from colliding). Events without one
    /// fall back to a digest of the enrollment-scoped natural key, so a
    /// redelivered payload always lands on the same id.
    pub fn dedup_id(&self) -> String {
        match &self.provider_event_id {
            Some(pid) => format!("{}-{}", self.provider, pid),
            None => {
                let mut hasher = Sha256::new();
                hasher.update(self.enrollment_id.as_deref().unwrap_or(""));
                hasher.update(b"|");
                hasher.update(self.event_type.as_str());
                hasher.update(b"|");
                hasher.update(self.timestamp.timestamp_millis().to_string());
                hex::encode(&hasher.finalize()[..16])
            }
        }
    }
}

/// A persisted telemetry event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignEvent {
    #[serde(deserialize_with = "deserialize_thing_id")]
    pub id: String,
    pub enrollment_id: String,
    pub instance_id: String,
    pub event_type: EventType,
    pub channel: Channel,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_event_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_number: Option<u32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Lifecycle of a dead-lettered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterStatus {
    Failed,
    Replaying,
    Replayed,
}

impl std::fmt::Display for DeadLetterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeadLetterStatus::Failed => write!(f, "failed"),
            DeadLetterStatus::Replaying => write!(f, "replaying"),
            DeadLetterStatus::Replayed => write!(f, "replayed"),
        }
    }
}

/// A webhook event that exhausted its retries, held for admin replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEvent {
    #[serde(deserialize_with = "deserialize_thing_id")]
    pub id: String,
    pub provider: String,
    /// The payload as it stood when retries ran out. Orphan-exhaustion
    /// entries hold the normalized event JSON.
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub failure_reason: String,
    pub status: DeadLetterStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replayed_at: Option<DateTime<Utc>>,
}

/// An orphaned-queue entry: a normalized event waiting for its enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanedEvent {
    #[serde(deserialize_with = "deserialize_thing_id")]
    pub id: String,
    pub event: NormalizedEvent,
    pub retry_count: u32,
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(provider_event_id: Option<&str>) -> NormalizedEvent {
        NormalizedEvent {
            provider_event_id: provider_event_id.map(String::from),
            provider_message_id: Some("msg_1".to_string()),
            enrollment_id: Some("enr_1".to_string()),
            instance_id: Some("inst_1".to_string()),
            event_type: EventType::Opened,
            channel: Channel::Email,
            provider: "lemlist".to_string(),
            timestamp: chrono::DateTime::parse_from_rfc3339("2025-06-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            step_number: Some(1),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_counter_field_mapping() {
        assert_eq!(EventType::Sent.counter_field(), Some("total_sent"));
        assert_eq!(EventType::Delivered.counter_field(), Some("total_delivered"));
        assert_eq!(EventType::Opened.counter_field(), Some("total_opened"));
        assert_eq!(EventType::Clicked.counter_field(), Some("total_clicked"));
        assert_eq!(EventType::Replied.counter_field(), Some("total_replied"));
        assert_eq!(EventType::Bounced.counter_field(), Some("total_bounced"));
        assert_eq!(
            EventType::Unsubscribed.counter_field(),
            Some("total_unsubscribed")
        );
        assert_eq!(EventType::Errored.counter_field(), Some("total_errored"));
        assert_eq!(EventType::VideoFailed.counter_field(), Some("total_errored"));
        assert_eq!(EventType::VideoGenerated.counter_field(), None);
    }

    #[test]
    fn test_event_type_serialization() {
        assert_eq!(
            serde_json::to_string(&EventType::Unsubscribed).unwrap(),
            "\"unsubscribed\""
        );
        assert_eq!(
            serde_json::to_string(&EventType::VideoGenerated).unwrap(),
            "\"video_generated\""
        );
    }

    #[test]
    fn test_channel_round_trip() {
        for channel in ["email", "linkedin", "video"] {
            let parsed: Channel = channel.parse().unwrap();
            assert_eq!(parsed.to_string(), channel);
        }
        assert!("sms".parse::<Channel>().is_err());
    }

    #[test]
    fn test_dedup_id_uses_provider_event_id() {
        let ev = event(Some("evt_42"));
        assert_eq!(ev.dedup_id(), "lemlist-evt_42");
    }

    #[test]
    fn test_dedup_id_stable_without_provider_event_id() {
        let a = event(None);
        let b = event(None);
        assert_eq!(a.dedup_id(), b.dedup_id());

        let mut c = event(None);
        c.event_type = EventType::Clicked;
        assert_ne!(a.dedup_id(), c.dedup_id());
    }

    #[test]
    fn test_normalized_event_round_trip() {
        let ev = event(Some("evt_7"));
        let json = serde_json::to_string(&ev).unwrap();
        let back: NormalizedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.provider_event_id.as_deref(), Some("evt_7"));
        assert_eq!(back.event_type, EventType::Opened);
        assert_eq!(back.channel, Channel::Email);
    }
}
