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

//! Lemlist email provider.
//!
//! Lemlist is campaign-based: "sending" an email enrolls the lead into the
//! provider-side campaign, and Lemlist reports delivery telemetry back via
//! webhooks (`emailsSent`, `emailsOpened`, ...). The returned `messageId`
//! is the correlation key stored on the enrollment.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::error::{transport_error, ProviderError};
use super::guard::guarded_call;
use super::provider::{
    DispatchReceipt, EmailMessage, EmailProvider, ProviderCapabilities, ProviderHealth,
    ProviderKind, RateLimitStatus,
};
use super::retry::RetryConfig;
use crate::models::Channel;
use crate::security;

pub const DEFAULT_LEMLIST_URL: &str = "https://api.lemlist.com/api";

/// Largest lead batch one API call may carry.
const LEMLIST_BATCH_LIMIT: usize = 100;
/// Documented team-level request budget per minute.
const LEMLIST_RATE_LIMIT: u32 = 20 * 60;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Lemlist email provider client.
pub struct LemlistProvider {
    api_key: String,
    webhook_secret: Option<String>,
    base_url: String,
    http: Arc<reqwest::Client>,
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl LemlistProvider {
    pub fn new(api_key: String, webhook_secret: Option<String>, http: Arc<reqwest::Client>) -> Self {
        Self {
            api_key,
            webhook_secret,
            base_url: DEFAULT_LEMLIST_URL.to_string(),
            http,
            breaker: CircuitBreaker::new(
                CircuitBreakerConfig::for_outreach_provider(),
                ProviderKind::Lemlist.to_string(),
            ),
            retry: RetryConfig::default(),
        }
    }

    /// Overrides the API base URL (tests point this at a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post_message(&self, message: &EmailMessage) -> Result<DispatchReceipt, ProviderError> {
        let provider = ProviderKind::Lemlist.as_str();
        let campaign = message.campaign_id.as_deref().unwrap_or("default");
        let url = format!(
            "{}/campaigns/{}/leads/{}",
            self.base_url, campaign, message.to
        );

        let response = self
            .http
            .post(&url)
            .basic_auth("", Some(&self.api_key))
            .json(&serde_json::json!({
                "subject": message.subject,
                "bodyHtml": message.body_html,
                "bodyText": message.body_text,
                "variables": message.custom_fields,
            }))
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(provider, status, body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| transport_error(provider, e))?;

        let message_id = body["messageId"]
            .as_str()
            .or_else(|| body["_id"].as_str())
            .ok_or_else(|| ProviderError::Api {
                provider: provider.to_string(),
                status,
                body: "response missing messageId".to_string(),
            })?
            .to_string();

        debug!(message_id = %message_id, "Lemlist accepted message");
        Ok(DispatchReceipt {
            provider_message_id: message_id,
            accepted_at: Utc::now(),
        })
    }
}

#[async_trait]
impl EmailProvider for LemlistProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Lemlist
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            channels: vec![Channel::Email],
            batch_limit: Some(LEMLIST_BATCH_LIMIT),
            supports_webhooks: true,
            supports_linkedin: false,
            max_generation_time_ms: None,
            polling_interval_ms: None,
        }
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::Config {
                provider: self.kind().to_string(),
                message: "LEMLIST_API_KEY is not set".to_string(),
            });
        }
        Ok(())
    }

    #[instrument(name = "lemlist_send", skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: &EmailMessage) -> Result<DispatchReceipt, ProviderError> {
        guarded_call(&self.breaker, &self.retry, self.kind().as_str(), || {
            self.post_message(message)
        })
        .await
    }

    #[instrument(name = "lemlist_batch_send", skip(self, messages), fields(count = messages.len()))]
    async fn batch_send(
        &self,
        messages: &[EmailMessage],
    ) -> Result<Vec<DispatchReceipt>, ProviderError> {
        if messages.len() > LEMLIST_BATCH_LIMIT {
            return Err(ProviderError::Validation {
                provider: self.kind().to_string(),
                message: format!(
                    "batch of {} exceeds lemlist limit of {}",
                    messages.len(),
                    LEMLIST_BATCH_LIMIT
                ),
            });
        }

        // Lemlist has no bulk-enroll endpoint; leads are enrolled one by
        // one, each under the shared breaker/retry policy.
        let mut receipts = Vec::with_capacity(messages.len());
        for message in messages {
            receipts.push(self.send(message).await?);
        }
        Ok(receipts)
    }

    async fn rate_limit_status(&self) -> Result<RateLimitStatus, ProviderError> {
        // Lemlist exposes no rate-limit endpoint; report the documented
        // per-minute budget with a window-aligned reset.
        Ok(RateLimitStatus {
            limit: LEMLIST_RATE_LIMIT,
            remaining: LEMLIST_RATE_LIMIT,
            reset_at: Utc::now() + chrono::Duration::seconds(60),
        })
    }

    async fn health_check(&self) -> ProviderHealth {
        let started = Instant::now();
        let url = format!("{}/team", self.base_url);
        let result = self
            .http
            .get(&url)
            .basic_auth("", Some(&self.api_key))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => ProviderHealth {
                healthy: true,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                detail: None,
            },
            Ok(response) => {
                warn!(status = %response.status(), "Lemlist health check degraded");
                ProviderHealth {
                    healthy: false,
                    latency_ms: Some(started.elapsed().as_millis() as u64),
                    detail: Some(format!("status {}", response.status())),
                }
            }
            Err(e) => ProviderHealth {
                healthy: false,
                latency_ms: None,
                detail: Some(e.to_string()),
            },
        }
    }

    fn verify_webhook_signature(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<(), ProviderError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| ProviderError::WebhookVerification {
                provider: self.kind().to_string(),
                message: "no webhook secret configured".to_string(),
            })?;

        security::verify_signature(secret, raw_body, signature).map_err(|e| {
            ProviderError::WebhookVerification {
                provider: self.kind().to_string(),
                message: e.to_string(),
            }
        })
    }
}
