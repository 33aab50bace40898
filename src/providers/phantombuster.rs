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

//! Phantombuster LinkedIn provider.
//!
//! LinkedIn actions run as Phantombuster agent launches; the returned
//! container id is the correlation key. LinkedIn caps connection notes at
//! 300 characters, enforced here before anything is launched.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::error::{transport_error, ProviderError};
use super::guard::guarded_call;
use super::provider::{
    ConnectionRequest, DispatchReceipt, LinkedInMessage, LinkedInProvider, ProviderCapabilities,
    ProviderHealth, ProviderKind, RateLimitStatus,
};
use super::retry::RetryConfig;
use crate::models::Channel;
use crate::security;

pub const DEFAULT_PHANTOMBUSTER_URL: &str = "https://api.phantombuster.com/api/v2";

/// LinkedIn tolerates only small daily volumes before flagging accounts.
const LINKEDIN_DAILY_LIMIT: u32 = 100;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Phantombuster LinkedIn provider client.
pub struct PhantombusterProvider {
    api_key: String,
    webhook_secret: Option<String>,
    /// Phantombuster agent that performs LinkedIn actions
    agent_id: String,
    base_url: String,
    http: Arc<reqwest::Client>,
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl PhantombusterProvider {
    pub fn new(api_key: String, webhook_secret: Option<String>, http: Arc<reqwest::Client>) -> Self {
        Self {
            api_key,
            webhook_secret,
            agent_id: "linkedin-outreach".to_string(),
            base_url: DEFAULT_PHANTOMBUSTER_URL.to_string(),
            http,
            breaker: CircuitBreaker::new(
                CircuitBreakerConfig::for_outreach_provider(),
                ProviderKind::Phantombuster.to_string(),
            ),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    async fn launch(&self, argument: serde_json::Value) -> Result<DispatchReceipt, ProviderError> {
        let provider = ProviderKind::Phantombuster.as_str();
        let response = self
            .http
            .post(format!("{}/agents/launch", self.base_url))
            .header("X-Phantombuster-Key", &self.api_key)
            .json(&serde_json::json!({
                "id": self.agent_id,
                "argument": argument,
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

        let container_id = body["containerId"]
            .as_str()
            .map(String::from)
            .or_else(|| body["containerId"].as_u64().map(|id| id.to_string()))
            .ok_or_else(|| ProviderError::Api {
                provider: provider.to_string(),
                status,
                body: "response missing containerId".to_string(),
            })?;

        debug!(container_id = %container_id, "Phantombuster launched agent");
        Ok(DispatchReceipt {
            provider_message_id: container_id,
            accepted_at: Utc::now(),
        })
    }
}

#[async_trait]
impl LinkedInProvider for PhantombusterProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Phantombuster
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            channels: vec![Channel::Linkedin],
            batch_limit: Some(LINKEDIN_DAILY_LIMIT as usize),
            supports_webhooks: true,
            supports_linkedin: true,
            max_generation_time_ms: None,
            polling_interval_ms: None,
        }
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::Config {
                provider: self.kind().to_string(),
                message: "PHANTOMBUSTER_API_KEY is not set".to_string(),
            });
        }
        Ok(())
    }

    #[instrument(name = "phantombuster_connection_request", skip(self, request), fields(profile = %request.profile_url))]
    async fn send_connection_request(
        &self,
        request: &ConnectionRequest,
    ) -> Result<DispatchReceipt, ProviderError> {
        self.validate_connection_request(request)?;

        let message = request.message.trim().to_string();
        guarded_call(&self.breaker, &self.retry, self.kind().as_str(), || {
            self.launch(serde_json::json!({
                "action": "connect",
                "profileUrl": request.profile_url,
                "message": message,
            }))
        })
        .await
    }

    #[instrument(name = "phantombuster_message", skip(self, message), fields(profile = %message.profile_url))]
    async fn send_message(
        &self,
        message: &LinkedInMessage,
    ) -> Result<DispatchReceipt, ProviderError> {
        if message.message.trim().is_empty() {
            return Err(ProviderError::Validation {
                provider: self.kind().to_string(),
                message: "LinkedIn message cannot be empty".to_string(),
            });
        }

        guarded_call(&self.breaker, &self.retry, self.kind().as_str(), || {
            self.launch(serde_json::json!({
                "action": "message",
                "profileUrl": message.profile_url,
                "message": message.message.trim(),
            }))
        })
        .await
    }

    async fn rate_limit_status(&self) -> Result<RateLimitStatus, ProviderError> {
        // LinkedIn account safety limit, reset daily.
        Ok(RateLimitStatus {
            limit: LINKEDIN_DAILY_LIMIT,
            remaining: LINKEDIN_DAILY_LIMIT,
            reset_at: Utc::now() + chrono::Duration::hours(24),
        })
    }

    async fn health_check(&self) -> ProviderHealth {
        let started = Instant::now();
        let result = self
            .http
            .get(format!("{}/agents/fetch?id={}", self.base_url, self.agent_id))
            .header("X-Phantombuster-Key", &self.api_key)
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
                warn!(status = %response.status(), "Phantombuster health check degraded");
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

    fn provider() -> PhantombusterProvider {
        PhantombusterProvider::new(
            "pb_test_key".to_string(),
            Some("whsec_pb".to_string()),
            Arc::new(reqwest::Client::new()),
        )
    }

    fn request(message: &str) -> ConnectionRequest {
        ConnectionRequest {
            profile_url: "https://www.linkedin.com/in/ada-lovelace".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_capabilities() {
        let caps = provider().capabilities();
        assert_eq!(caps.channels, vec![Channel::Linkedin]);
        assert!(caps.supports_linkedin);
    }

    #[test]
    fn test_connection_request_validation() {
        let p = provider();

        assert!(p.validate_connection_request(&request("Hi Ada, loved your article")).is_ok());
        assert!(p.validate_connection_request(&request("")).is_err());
        assert!(p.validate_connection_request(&request("   \n  ")).is_err());
        assert!(p
            .validate_connection_request(&request(&"x".repeat(301)))
            .is_err());
        // Exactly 300 after trim is allowed
        assert!(p
            .validate_connection_request(&request(&format!(" {} ", "x".repeat(300))))
            .is_ok());
    }

    #[tokio::test]
    async fn test_send_rejects_invalid_before_launch() {
        let p = provider();
        // An over-length note fails validation, not networking
        let result = p.send_connection_request(&request(&"x".repeat(400))).await;
        assert!(matches!(result, Err(ProviderError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_send_message_rejects_empty() {
        let p = provider();
        let result = p
            .send_message(&LinkedInMessage {
                profile_url: "https://www.linkedin.com/in/ada".to_string(),
                message: "  ".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Validation { .. })));
    }
}
