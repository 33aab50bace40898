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

//! Provider traits and common types.
//!
//! Providers are capability-scoped: an email provider, a LinkedIn provider
//! and a video provider expose different trait surfaces, and callers
//! inspect [`ProviderCapabilities`] before attempting an operation rather
//! than probing with failed calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::Channel;
use crate::security::Validator;

use super::error::ProviderError;

/// Known provider implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Lemlist multichannel outreach
    Lemlist,
    /// Postmark transactional email
    Postmark,
    /// Phantombuster LinkedIn automation
    Phantombuster,
    /// HeyGen avatar video generation
    Heygen,
}

impl ProviderKind {
    /// Lowercase tag used in config keys, webhook routes and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Lemlist => "lemlist",
            ProviderKind::Postmark => "postmark",
            ProviderKind::Phantombuster => "phantombuster",
            ProviderKind::Heygen => "heygen",
        }
    }

    /// The signature header each provider sends with its webhooks.
    pub fn signature_header(&self) -> &'static str {
        match self {
            ProviderKind::Lemlist => "x-lemlist-signature",
            ProviderKind::Postmark => "x-postmark-signature",
            ProviderKind::Phantombuster => "x-phantombuster-signature",
            ProviderKind::Heygen => "x-heygen-signature",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lemlist" => Ok(ProviderKind::Lemlist),
            "postmark" => Ok(ProviderKind::Postmark),
            "phantombuster" => Ok(ProviderKind::Phantombuster),
            "heygen" => Ok(ProviderKind::Heygen),
            _ => Err(ProviderError::Config {
                provider: s.to_string(),
                message: format!("unknown provider '{}'", s),
            }),
        }
    }
}

/// Declared properties of a provider.
///
/// Callers check capabilities before dispatching; a missing capability is a
/// caller bug, not a provider error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub channels: Vec<Channel>,
    /// Largest batch one call may carry, when batching is supported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_limit: Option<usize>,
    pub supports_webhooks: bool,
    pub supports_linkedin: bool,
    /// Upper bound on a video generation job (video providers only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_generation_time_ms: Option<u64>,
    /// Suggested poll interval for job status (video providers only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling_interval_ms: Option<u64>,
}

/// Point-in-time rate limit snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Health probe result. Probes degrade to unhealthy instead of erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// An outbound email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
    /// Provider-side campaign the message belongs to, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub custom_fields: serde_json::Value,
}

/// Receipt from a dispatched message. `provider_message_id` becomes the
/// enrollment's correlation key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub provider_message_id: String,
    pub accepted_at: DateTime<Utc>,
}

/// A LinkedIn connection request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub profile_url: String,
    /// Invitation note; LinkedIn caps these at 300 characters
    pub message: String,
}

/// A LinkedIn direct message to an existing connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedInMessage {
    pub profile_url: String,
    pub message: String,
}

/// A video generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRequest {
    pub avatar_id: String,
    pub script: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Status of a video generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum VideoJobStatus {
    Pending,
    Processing,
    Completed { video_url: String },
    Failed { reason: String },
}

/// A video generation job handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoJob {
    pub job_id: String,
    #[serde(flatten)]
    pub status: VideoJobStatus,
}

/// Email dispatch capability.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Checks credentials/settings without performing I/O.
    fn validate_config(&self) -> Result<(), ProviderError>;

    async fn send(&self, message: &EmailMessage) -> Result<DispatchReceipt, ProviderError>;

    /// Dispatches a batch; the batch must respect `capabilities().batch_limit`.
    async fn batch_send(
        &self,
        messages: &[EmailMessage],
    ) -> Result<Vec<DispatchReceipt>, ProviderError>;

    async fn rate_limit_status(&self) -> Result<RateLimitStatus, ProviderError>;

    /// Short-timeout probe; degrades to unhealthy instead of propagating.
    async fn health_check(&self) -> ProviderHealth;

    /// Verifies a webhook signature over the exact raw bytes.
    fn verify_webhook_signature(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<(), ProviderError>;
}

/// LinkedIn outreach capability.
#[async_trait]
pub trait LinkedInProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> ProviderCapabilities;

    fn validate_config(&self) -> Result<(), ProviderError>;

    /// Rejects empty, whitespace-only or over-length (> 300 chars, after
    /// trimming) invitation notes before anything reaches the provider.
    fn validate_connection_request(&self, request: &ConnectionRequest) -> Result<(), ProviderError> {
        Validator::validate_linkedin_message(&request.message).map_err(|e| {
            ProviderError::Validation {
                provider: self.kind().to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(())
    }

    async fn send_connection_request(
        &self,
        request: &ConnectionRequest,
    ) -> Result<DispatchReceipt, ProviderError>;

    async fn send_message(
        &self,
        message: &LinkedInMessage,
    ) -> Result<DispatchReceipt, ProviderError>;

    async fn rate_limit_status(&self) -> Result<RateLimitStatus, ProviderError>;

    async fn health_check(&self) -> ProviderHealth;

    fn verify_webhook_signature(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<(), ProviderError>;
}

/// Personalized video generation capability.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> ProviderCapabilities;

    fn validate_config(&self) -> Result<(), ProviderError>;

    async fn generate_video(&self, request: &VideoRequest) -> Result<VideoJob, ProviderError>;

    async fn video_status(&self, job_id: &str) -> Result<VideoJob, ProviderError>;

    /// Downloads a finished video.
    ///
    /// The URL must be HTTPS with a host on the provider's allowed-domain
    /// list; the destination must resolve inside the configured download
    /// directory with a `.mp4`/`.webm`/`.mov` extension. Traversal attempts
    /// are rejected before any network I/O.
    async fn download_video(&self, url: &str, destination: &Path)
        -> Result<PathBuf, ProviderError>;

    async fn health_check(&self) -> ProviderHealth;

    fn verify_webhook_signature(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_round_trip() {
        for kind in [
            ProviderKind::Lemlist,
            ProviderKind::Postmark,
            ProviderKind::Phantombuster,
            ProviderKind::Heygen,
        ] {
            let parsed: ProviderKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_provider_kind_case_insensitive() {
        assert_eq!(
            "Lemlist".parse::<ProviderKind>().unwrap(),
            ProviderKind::Lemlist
        );
        assert_eq!(
            "HEYGEN".parse::<ProviderKind>().unwrap(),
            ProviderKind::Heygen
        );
    }

    #[test]
    fn test_unknown_provider_kind() {
        let err = "sendgrid".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, ProviderError::Config { .. }));
    }

    #[test]
    fn test_signature_headers_are_provider_named() {
        assert_eq!(
            ProviderKind::Lemlist.signature_header(),
            "x-lemlist-signature"
        );
        assert_eq!(
            ProviderKind::Postmark.signature_header(),
            "x-postmark-signature"
        );
    }

    #[test]
    fn test_video_job_status_wire_shape() {
        let job = VideoJob {
            job_id: "vid_1".to_string(),
            status: VideoJobStatus::Completed {
                video_url: "https://cdn.heygen.com/v/vid_1.mp4".to_string(),
            },
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["job_id"], "vid_1");
        assert!(json["video_url"].as_str().unwrap().ends_with(".mp4"));
    }
}
