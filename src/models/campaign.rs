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

//! Campaign template and instance models.
//!
//! A [`CampaignTemplate`] is the reusable definition of a multi-step
//! sequence; a [`CampaignInstance`] is one running materialization of it and
//! the owner of the aggregate delivery counters. Counters only ever move
//! through the event pipeline's transaction, which keeps them monotone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::serde_utils::deserialize_thing_id;

/// Which channels a campaign drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    Email,
    Linkedin,
    Multichannel,
}

/// Whether steps follow a fixed order or branch dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    Structured,
    Dynamic,
}

/// One step of a template's sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateStep {
    pub step_number: u32,
    pub channel: super::Channel,
    /// Action tag ("send_email", "connection_request", ...)
    pub action: String,
    /// Delay relative to the previous step, in hours
    #[serde(default)]
    pub delay_hours: u32,
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// Reusable definition of a multi-step outreach sequence.
///
/// Templates referenced by an active instance are treated as immutable;
/// changes go into a new version instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignTemplate {
    #[serde(deserialize_with = "deserialize_thing_id")]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub campaign_type: CampaignType,
    pub path_type: PathType,
    pub is_active: bool,
    pub steps: Vec<TemplateStep>,
    #[serde(default)]
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Campaign instance lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
}

impl InstanceStatus {
    /// Whether the transition `self -> next` is allowed.
    ///
    /// draft -> active; active <-> paused; active|paused -> completed;
    /// completed -> archived. Archived is terminal.
    pub fn can_transition_to(&self, next: InstanceStatus) -> bool {
        use InstanceStatus::*;
        matches!(
            (self, next),
            (Draft, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Active, Completed)
                | (Paused, Completed)
                | (Completed, Archived)
        )
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Draft => write!(f, "draft"),
            InstanceStatus::Active => write!(f, "active"),
            InstanceStatus::Paused => write!(f, "paused"),
            InstanceStatus::Completed => write!(f, "completed"),
            InstanceStatus::Archived => write!(f, "archived"),
        }
    }
}

/// Aggregate delivery counters for one instance.
///
/// Every field is monotonically non-decreasing and advances only via the
/// event pipeline's database-side increment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignCounters {
    #[serde(default)]
    pub total_sent: u64,
    #[serde(default)]
    pub total_delivered: u64,
    #[serde(default)]
    pub total_opened: u64,
    #[serde(default)]
    pub total_clicked: u64,
    #[serde(default)]
    pub total_replied: u64,
    #[serde(default)]
    pub total_bounced: u64,
    #[serde(default)]
    pub total_unsubscribed: u64,
    #[serde(default)]
    pub total_errored: u64,
}

impl CampaignCounters {
    /// delivered / sent.
    pub fn delivery_rate(&self) -> f64 {
        ratio(self.total_delivered, self.total_sent)
    }

    /// opened / delivered. The denominator is deliveries, not sends.
    pub fn open_rate(&self) -> f64 {
        ratio(self.total_opened, self.total_delivered)
    }

    /// clicked / opened.
    pub fn click_through_rate(&self) -> f64 {
        ratio(self.total_clicked, self.total_opened)
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// A running materialization of a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignInstance {
    #[serde(deserialize_with = "deserialize_thing_id")]
    pub id: String,
    pub template_id: String,
    pub owner_id: String,
    pub name: String,
    pub status: InstanceStatus,
    /// Which provider dispatches this instance's messages
    pub provider: String,
    #[serde(flatten)]
    pub counters: CampaignCounters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use InstanceStatus::*;
        assert!(Draft.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Archived));

        assert!(!Draft.can_transition_to(Completed));
        assert!(!Archived.can_transition_to(Active));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Paused.can_transition_to(Archived));
    }

    #[test]
    fn test_open_rate_divides_by_delivered() {
        let counters = CampaignCounters {
            total_sent: 200,
            total_delivered: 100,
            total_opened: 40,
            total_clicked: 10,
            ..Default::default()
        };

        // 40/100, not 40/200
        assert!((counters.open_rate() - 0.4).abs() < f64::EPSILON);
        assert!((counters.delivery_rate() - 0.5).abs() < f64::EPSILON);
        assert!((counters.click_through_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rates_zero_denominator() {
        let counters = CampaignCounters::default();
        assert_eq!(counters.delivery_rate(), 0.0);
        assert_eq!(counters.open_rate(), 0.0);
        assert_eq!(counters.click_through_rate(), 0.0);
    }

    #[test]
    fn test_counters_flatten_into_instance_json() {
        let instance = CampaignInstance {
            id: "inst_1".to_string(),
            template_id: "tpl_1".to_string(),
            owner_id: "acct_1".to_string(),
            name: "Q3 SaaS outbound".to_string(),
            status: InstanceStatus::Active,
            provider: "lemlist".to_string(),
            counters: CampaignCounters {
                total_sent: 5,
                ..Default::default()
            },
            started_at: Some(Utc::now()),
            paused_at: None,
            completed_at: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&instance).unwrap();
        assert_eq!(json["total_sent"], 5);
        assert_eq!(json["status"], "active");
    }
}
