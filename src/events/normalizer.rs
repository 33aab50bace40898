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

//! Webhook payload normalization.
//!
//! Each provider reports telemetry in its own schema; this module maps all
//! of them onto [`NormalizedEvent`]. Event types a provider emits that the
//! platform does not track (list verifications, warm-up traffic, ...)
//! normalize to `None` and are acknowledged without side effects.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Channel, EventType, NormalizedEvent};
use crate::providers::ProviderKind;

/// Normalization failures. These map to a 400 at the HTTP layer: the
/// payload parsed as JSON but does not carry the fields the provider's
/// schema promises.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("payload missing required field '{0}'")]
    MissingField(&'static str),
}

/// Converts a parsed webhook payload into the normalized event shape.
///
/// Returns `Ok(None)` for recognized-but-untracked event types.
pub fn normalize(
    provider: ProviderKind,
    payload: &serde_json::Value,
) -> Result<Option<NormalizedEvent>, NormalizeError> {
    match provider {
        ProviderKind::Lemlist => normalize_lemlist(payload),
        ProviderKind::Postmark => normalize_postmark(payload),
        ProviderKind::Phantombuster => normalize_phantombuster(payload),
        ProviderKind::Heygen => normalize_heygen(payload),
    }
}

fn parse_timestamp(value: &serde_json::Value) -> DateTime<Utc> {
    if let Some(s) = value.as_str() {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
            return parsed.with_timezone(&Utc);
        }
    }
    if let Some(epoch) = value.as_i64() {
        // Providers disagree on seconds vs milliseconds; anything past the
        // year 2200 in seconds is treated as milliseconds.
        let parsed = if epoch > 7_258_118_400 {
            DateTime::from_timestamp_millis(epoch)
        } else {
            DateTime::from_timestamp(epoch, 0)
        };
        if let Some(parsed) = parsed {
            return parsed;
        }
    }
    Utc::now()
}

/// Lemlist: `{"_id", "type": "emailsOpened", "messageId", "sequenceStep",
/// "date", ...}`. LinkedIn steps report `linkedin*` types on the same
/// webhook.
fn normalize_lemlist(
    payload: &serde_json::Value,
) -> Result<Option<NormalizedEvent>, NormalizeError> {
    let event_tag = payload["type"]
        .as_str()
        .ok_or(NormalizeError::MissingField("type"))?;

    let event_type = match event_tag {
        "emailsSent" | "linkedinSent" => EventType::Sent,
        "emailsDelivered" => EventType::Delivered,
        "emailsOpened" => EventType::Opened,
        "emailsClicked" | "linkedinClicked" => EventType::Clicked,
        "emailsReplied" | "linkedinReplied" => EventType::Replied,
        "emailsBounced" => EventType::Bounced,
        "emailsUnsubscribed" => EventType::Unsubscribed,
        "emailsFailed" | "emailsSendFailed" | "linkedinSendFailed" => EventType::Errored,
        // interest marks, pauses, skips: tracked provider-side only
        _ => return Ok(None),
    };

    let channel = if event_tag.starts_with("linkedin") {
        Channel::Linkedin
    } else {
        Channel::Email
    };

    Ok(Some(NormalizedEvent {
        provider_event_id: payload["_id"].as_str().map(String::from),
        provider_message_id: payload["messageId"].as_str().map(String::from),
        enrollment_id: None,
        instance_id: None,
        event_type,
        channel,
        provider: ProviderKind::Lemlist.to_string(),
        timestamp: parse_timestamp(&payload["date"]),
        step_number: payload["sequenceStep"].as_u64().map(|s| s as u32),
        metadata: payload.clone(),
    }))
}

/// Postmark: `{"RecordType": "Delivery" | "Open" | ..., "MessageID", ...}`.
/// Open/Click events carry no provider-side event id, which exercises the
/// natural-key dedup fallback.
fn normalize_postmark(
    payload: &serde_json::Value,
) -> Result<Option<NormalizedEvent>, NormalizeError> {
    let record_type = payload["RecordType"]
        .as_str()
        .ok_or(NormalizeError::MissingField("RecordType"))?;

    let event_type = match record_type {
        "Delivery" => EventType::Delivered,
        "Open" => EventType::Opened,
        "Click" => EventType::Clicked,
        "Bounce" => EventType::Bounced,
        "SpamComplaint" => EventType::Unsubscribed,
        "SubscriptionChange" => {
            if payload["SuppressSending"].as_bool().unwrap_or(false) {
                EventType::Unsubscribed
            } else {
                return Ok(None);
            }
        }
        _ => return Ok(None),
    };

    let timestamp = ["DeliveredAt", "ReceivedAt", "BouncedAt", "ChangedAt"]
        .iter()
        .find(|key| !payload[**key].is_null())
        .map(|key| parse_timestamp(&payload[*key]))
        .unwrap_or_else(Utc::now);

    // Bounces carry a numeric "ID"; the rest have no event id.
    let provider_event_id = payload["ID"].as_i64().map(|id| id.to_string());

    Ok(Some(NormalizedEvent {
        provider_event_id,
        provider_message_id: payload["MessageID"].as_str().map(String::from),
        enrollment_id: None,
        instance_id: None,
        event_type,
        channel: Channel::Email,
        provider: ProviderKind::Postmark.to_string(),
        timestamp,
        step_number: payload["Metadata"]["step_number"]
            .as_u64()
            .map(|s| s as u32),
        metadata: payload.clone(),
    }))
}

/// Phantombuster webhook from the LinkedIn outreach agent:
/// `{"eventId", "event": "invite.accepted", "containerId", "timestamp"}`.
/// The container id of the launch is the correlation key.
fn normalize_phantombuster(
    payload: &serde_json::Value,
) -> Result<Option<NormalizedEvent>, NormalizeError> {
    let event_tag = payload["event"]
        .as_str()
        .ok_or(NormalizeError::MissingField("event"))?;

    let event_type = match event_tag {
        "invite.sent" | "message.sent" => EventType::Sent,
        "invite.accepted" => EventType::Delivered,
        "message.replied" => EventType::Replied,
        "invite.declined" => EventType::Bounced,
        "agent.error" => EventType::Errored,
        _ => return Ok(None),
    };

    let container_id = payload["containerId"]
        .as_str()
        .map(String::from)
        .or_else(|| payload["containerId"].as_u64().map(|id| id.to_string()));

    Ok(Some(NormalizedEvent {
        provider_event_id: payload["eventId"].as_str().map(String::from),
        provider_message_id: container_id,
        enrollment_id: None,
        instance_id: None,
        event_type,
        channel: Channel::Linkedin,
        provider: ProviderKind::Phantombuster.to_string(),
        timestamp: parse_timestamp(&payload["timestamp"]),
        step_number: None,
        metadata: payload.clone(),
    }))
}

/// HeyGen generation callbacks: `{"event_type": "avatar_video.success",
/// "event_data": {"video_id", "callback_id", "url"}}`. The callback id is
/// set to the enrollment's correlation key at generation time.
fn normalize_heygen(
    payload: &serde_json::Value,
) -> Result<Option<NormalizedEvent>, NormalizeError> {
    let event_tag = payload["event_type"]
        .as_str()
        .ok_or(NormalizeError::MissingField("event_type"))?;

    let event_type = match event_tag {
        "avatar_video.success" => EventType::VideoGenerated,
        "avatar_video.fail" => EventType::VideoFailed,
        _ => return Ok(None),
    };

    let data = &payload["event_data"];
    let message_id = data["callback_id"]
        .as_str()
        .or_else(|| data["video_id"].as_str())
        .map(String::from);

    Ok(Some(NormalizedEvent {
        provider_event_id: None,
        provider_message_id: message_id,
        enrollment_id: None,
        instance_id: None,
        event_type,
        channel: Channel::Video,
        provider: ProviderKind::Heygen.to_string(),
        timestamp: Utc::now(),
        step_number: None,
        metadata: payload.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lemlist_opened() {
        let payload = json!({
            "_id": "evt_1",
            "type": "emailsOpened",
            "messageId": "msg_42",
            "sequenceStep": 2,
            "date": "2025-06-01T10:00:00Z",
            "leadEmail": "ada@example.com",
        });

        let ev = normalize(ProviderKind::Lemlist, &payload).unwrap().unwrap();
        assert_eq!(ev.event_type, EventType::Opened);
        assert_eq!(ev.channel, Channel::Email);
        assert_eq!(ev.provider_event_id.as_deref(), Some("evt_1"));
        assert_eq!(ev.provider_message_id.as_deref(), Some("msg_42"));
        assert_eq!(ev.step_number, Some(2));
        assert_eq!(ev.timestamp.to_rfc3339(), "2025-06-01T10:00:00+00:00");
    }

    #[test]
    fn test_lemlist_linkedin_channel() {
        let payload = json!({
            "_id": "evt_2",
            "type": "linkedinReplied",
            "messageId": "msg_li_1",
        });

        let ev = normalize(ProviderKind::Lemlist, &payload).unwrap().unwrap();
        assert_eq!(ev.channel, Channel::Linkedin);
        assert_eq!(ev.event_type, EventType::Replied);
    }

    #[test]
    fn test_lemlist_untracked_type_ignored() {
        let payload = json!({"_id": "evt_3", "type": "emailsInterested"});
        assert!(normalize(ProviderKind::Lemlist, &payload).unwrap().is_none());
    }

    #[test]
    fn test_lemlist_missing_type_fails() {
        let payload = json!({"_id": "evt_4"});
        assert!(normalize(ProviderKind::Lemlist, &payload).is_err());
    }

    #[test]
    fn test_postmark_delivery() {
        let payload = json!({
            "RecordType": "Delivery",
            "MessageID": "pm_msg_1",
            "DeliveredAt": "2025-06-01T11:00:00Z",
        });

        let ev = normalize(ProviderKind::Postmark, &payload).unwrap().unwrap();
        assert_eq!(ev.event_type, EventType::Delivered);
        // Delivery events carry no provider event id
        assert!(ev.provider_event_id.is_none());
        assert_eq!(ev.provider_message_id.as_deref(), Some("pm_msg_1"));
    }

    #[test]
    fn test_postmark_bounce_has_event_id() {
        let payload = json!({
            "RecordType": "Bounce",
            "ID": 4323372036854775807i64,
            "MessageID": "pm_msg_2",
            "BouncedAt": "2025-06-01T11:05:00Z",
        });

        let ev = normalize(ProviderKind::Postmark, &payload).unwrap().unwrap();
        assert_eq!(ev.event_type, EventType::Bounced);
        assert_eq!(
            ev.provider_event_id.as_deref(),
            Some("4323372036854775807")
        );
    }

    #[test]
    fn test_postmark_subscription_change() {
        let suppressing = json!({
            "RecordType": "SubscriptionChange",
            "MessageID": "pm_msg_3",
            "SuppressSending": true,
            "ChangedAt": "2025-06-01T12:00:00Z",
        });
        let ev = normalize(ProviderKind::Postmark, &suppressing)
            .unwrap()
            .unwrap();
        assert_eq!(ev.event_type, EventType::Unsubscribed);

        let reactivation = json!({
            "RecordType": "SubscriptionChange",
            "MessageID": "pm_msg_3",
            "SuppressSending": false,
        });
        assert!(normalize(ProviderKind::Postmark, &reactivation)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_phantombuster_accepted() {
        let payload = json!({
            "eventId": "pb_evt_1",
            "event": "invite.accepted",
            "containerId": 981234,
            "timestamp": 1748775600,
        });

        let ev = normalize(ProviderKind::Phantombuster, &payload)
            .unwrap()
            .unwrap();
        assert_eq!(ev.event_type, EventType::Delivered);
        assert_eq!(ev.channel, Channel::Linkedin);
        assert_eq!(ev.provider_message_id.as_deref(), Some("981234"));
    }

    #[test]
    fn test_heygen_success_and_fail() {
        let success = json!({
            "event_type": "avatar_video.success",
            "event_data": {"video_id": "vid_1", "callback_id": "msg_video_1", "url": "https://resource.heygen.ai/v/vid_1.mp4"},
        });
        let ev = normalize(ProviderKind::Heygen, &success).unwrap().unwrap();
        assert_eq!(ev.event_type, EventType::VideoGenerated);
        assert_eq!(ev.channel, Channel::Video);
        assert_eq!(ev.provider_message_id.as_deref(), Some("msg_video_1"));

        let fail = json!({
            "event_type": "avatar_video.fail",
            "event_data": {"video_id": "vid_2"},
        });
        let ev = normalize(ProviderKind::Heygen, &fail).unwrap().unwrap();
        assert_eq!(ev.event_type, EventType::VideoFailed);
        assert_eq!(ev.provider_message_id.as_deref(), Some("vid_2"));
    }

    #[test]
    fn test_epoch_millis_timestamp() {
        let payload = json!({
            "eventId": "pb_evt_2",
            "event": "message.replied",
            "containerId": "123",
            "timestamp": 1748775600000i64,
        });
        let ev = normalize(ProviderKind::Phantombuster, &payload)
            .unwrap()
            .unwrap();
        assert_eq!(ev.timestamp.timestamp(), 1_748_775_600);
    }
}
