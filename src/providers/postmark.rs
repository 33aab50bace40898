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

//! Postmark email provider.
//!
//! Transactional email with true batch support (`/email/batch`, up to 500
//! messages per call). Postmark's `MessageID` is the correlation key; its
//! webhooks (`Delivery`, `Open`, `Bounce`, ...) carry it back.

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

pub const DEFAULT_POSTMARK_URL: &str = "https://api.postmarkapp.com";

const POSTMARK_BATCH_LIMIT: usize = 500;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Postmark email provider client.
pub struct PostmarkProvider {
    server_token: String,
    webhook_secret: Option<String>,
    sender: String,
    base_url: String,
    http: Arc<reqwest::Client>,
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl PostmarkProvider {
    pub fn new(
        server_token: String,
        webhook_secret: Option<String>,
        http: Arc<reqwest::Client>,
    ) -> Self {
        Self {
            server_token,
            webhook_secret,
            sender: "outreach@cadencelabs.dev".to_string(),
            base_url: DEFAULT_POSTMARK_URL.to_string(),
            http,
            breaker: CircuitBreaker::new(
                CircuitBreakerConfig::for_outreach_provider(),
                ProviderKind::Postmark.to_string(),
            ),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    fn message_body(&self, message: &EmailMessage) -> serde_json::Value {
        serde_json::json!({
            "From": self.sender,
            "To": message.to,
            "Subject": message.subject,
            "HtmlBody": message.body_html,
            "TextBody": message.body_text,
            "Metadata": message.custom_fields,
            "TrackOpens": true,
            "TrackLinks": "HtmlAndText",
        })
    }

    fn receipt_from(&self, body: &serde_json::Value, status: u16) -> Result<DispatchReceipt, ProviderError> {
        let message_id = body["MessageID"]
            .as_str()
            .ok_or_else(|| ProviderError::Api {
                provider: self.kind().to_string(),
                status,
                body: "response missing MessageID".to_string(),
            })?
            .to_string();

        Ok(DispatchReceipt {
            provider_message_id: message_id,
            accepted_at: Utc::now(),
        })
    }

    async fn post_email(&self, message: &EmailMessage) -> Result<DispatchReceipt, ProviderError> {
        let provider = ProviderKind::Postmark.as_str();
        let response = self
            .http
            .post(format!("{}/email", self.base_url))
            .header("X-Postmark-Server-Token", &self.server_token)
            .json(&self.message_body(message))
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
        self.receipt_from(&body, status)
    }

    async fn post_batch(
        &self,
        messages: &[EmailMessage],
    ) -> Result<Vec<DispatchReceipt>, ProviderError> {
        let provider = ProviderKind::Postmark.as_str();
        let payload: Vec<serde_json::Value> =
            messages.iter().map(|m| self.message_body(m)).collect();

        let response = self
            .http
            .post(format!("{}/email/batch", self.base_url))
            .header("X-Postmark-Server-Token", &self.server_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(provider, status, body));
        }

        let body: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| transport_error(provider, e))?;

        debug!(count = body.len(), "Postmark accepted batch");
        body.iter()
            .map(|item| self.receipt_from(item, status))
            .collect()
    }
}

#[async_trait]
impl EmailProvider for PostmarkProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Postmark
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            channels: vec![Channel::Email],
            batch_limit: Some(POSTMARK_BATCH_LIMIT),
            supports_webhooks: true,
            supports_linkedin: false,
            max_generation_time_ms: None,
            polling_interval_ms: None,
        }
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        if self.server_token.trim().is_empty() {
            return Err(ProviderError::Config {
                provider: self.kind().to_string(),
                message: "POSTMARK_API_KEY is not set".to_string(),
            });
        }
        if !self.sender.contains('@') {
            return Err(ProviderError::Config {
                provider: self.kind().to_string(),
                message: format!("invalid sender address '{}'", self.sender),
            });
        }
        Ok(())
    }

    #[instrument(name = "postmark_send", skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: &EmailMessage) -> Result<DispatchReceipt, ProviderError> {
        guarded_call(&self.breaker, &self.retry, self.kind().as_str(), || {
            self.post_email(message)
        })
        .await
    }

    #[instrument(name = "postmark_batch_send", skip(self, messages), fields(count = messages.len()))]
    async fn batch_send(
        &self,
        messages: &[EmailMessage],
    ) -> Result<Vec<DispatchReceipt>, ProviderError> {
        if messages.len() > POSTMARK_BATCH_LIMIT {
            return Err(ProviderError::Validation {
                provider: self.kind().to_string(),
                message: format!(
                    "batch of {} exceeds postmark limit of {}",
                    messages.len(),
                    POSTMARK_BATCH_LIMIT
                ),
            });
        }

        guarded_call(&self.breaker, &self.retry, self.kind().as_str(), || {
            self.post_batch(messages)
        })
        .await
    }

    async fn rate_limit_status(&self) -> Result<RateLimitStatus, ProviderError> {
        // Postmark enforces no hard request ceiling on the email endpoints;
        // surface the batch size as the practical per-call budget.
        Ok(RateLimitStatus {
            limit: POSTMARK_BATCH_LIMIT as u32,
            remaining: POSTMARK_BATCH_LIMIT as u32,
            reset_at: Utc::now() + chrono::Duration::seconds(60),
        })
    }

    async fn health_check(&self) -> ProviderHealth {
        let started = Instant::now();
        let result = self
            .http
            .get(format!("{}/server", self.base_url))
            .header("X-Postmark-Server-Token", &self.server_token)
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
                warn!(status = %response.status(), "Postmark health check degraded");
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

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> PostmarkProvider {
        PostmarkProvider::new(
            "pm_server_token".to_string(),
            Some("whsec_postmark".to_string()),
            Arc::new(reqwest::Client::new()),
        )
    }

    #[test]
    fn test_capabilities() {
        let caps = provider().capabilities();
        assert_eq!(caps.batch_limit, Some(500));
        assert!(caps.supports_webhooks);
    }

    #[test]
    fn test_validate_config_rejects_bad_sender() {
        let p = provider().with_sender("not-an-address");
        assert!(matches!(
            p.validate_config(),
            Err(ProviderError::Config { .. })
        ));
    }

    #[test]
    fn test_message_body_shape() {
        let p = provider();
        let body = p.message_body(&EmailMessage {
            to: "ada@example.com".to_string(),
            subject: "Quick question".to_string(),
            body_html: Some("<p>Hi</p>".to_string()),
            body_text: None,
            campaign_id: None,
            custom_fields: serde_json::json!({"instance_id": "inst_1"}),
        });

        assert_eq!(body["To"], "ada@example.com");
        assert_eq!(body["Subject"], "Quick question");
        assert_eq!(body["Metadata"]["instance_id"], "inst_1");
        assert_eq!(body["TrackOpens"], true);
    }

    #[tokio::test]
    async fn test_batch_over_limit_rejected() {
        let p = provider();
        let messages: Vec<EmailMessage> = (0..501)
            .map(|i| EmailMessage {
                to: format!("lead{}@example.com", i),
                subject: "Hello".to_string(),
                body_html: None,
                body_text: Some("Hi".to_string()),
                campaign_id: None,
                custom_fields: serde_json::json!({}),
            })
            .collect();

        let result = p.batch_send(&messages).await;
        assert!(matches!(result, Err(ProviderError::Validation { .. })));
    }

    #[test]
    fn test_webhook_signature() {
        let p = provider();
        let payload = br#"{"RecordType":"Delivery"}"#;
        let sig = security::compute_signature("whsec_postmark", payload);
        assert!(p.verify_webhook_signature(payload, &sig).is_ok());
        assert!(p.verify_webhook_signature(payload, "bad").is_err());
    }
}
