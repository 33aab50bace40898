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

//! HeyGen video provider.
//!
//! Avatar video generation is asynchronous: `generate_video` starts a job,
//! callers poll `video_status` (or consume the completion webhook), then
//! `download_video` fetches the finished asset. Downloads only accept HTTPS
//! URLs on the allowed-domain list and destinations confined to the
//! configured download directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::error::{transport_error, ProviderError};
use super::guard::guarded_call;
use super::provider::{
    ProviderCapabilities, ProviderHealth, ProviderKind, VideoJob, VideoJobStatus, VideoProvider,
    VideoRequest,
};
use super::retry::RetryConfig;
use crate::models::Channel;
use crate::security::{self, Validator};

pub const DEFAULT_HEYGEN_URL: &str = "https://api.heygen.com";

/// Generation jobs beyond this are treated as failed.
const MAX_GENERATION_TIME_MS: u64 = 10 * 60 * 1000;
/// Suggested status poll interval.
const POLLING_INTERVAL_MS: u64 = 5_000;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// HeyGen video provider client.
pub struct HeygenProvider {
    api_key: String,
    webhook_secret: Option<String>,
    base_url: String,
    download_dir: PathBuf,
    allowed_domains: Vec<String>,
    http: Arc<reqwest::Client>,
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl HeygenProvider {
    pub fn new(
        api_key: String,
        webhook_secret: Option<String>,
        download_dir: PathBuf,
        allowed_domains: Vec<String>,
        http: Arc<reqwest::Client>,
    ) -> Self {
        Self {
            api_key,
            webhook_secret,
            base_url: DEFAULT_HEYGEN_URL.to_string(),
            download_dir,
            allowed_domains,
            http,
            breaker: CircuitBreaker::new(
                CircuitBreakerConfig::for_outreach_provider(),
                ProviderKind::Heygen.to_string(),
            ),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn job_from_response(
        &self,
        body: &serde_json::Value,
        status: u16,
    ) -> Result<VideoJob, ProviderError> {
        let data = &body["data"];
        let job_id = data["video_id"]
            .as_str()
            .ok_or_else(|| ProviderError::Api {
                provider: self.kind().to_string(),
                status,
                body: "response missing video_id".to_string(),
            })?
            .to_string();

        let job_status = match data["status"].as_str().unwrap_or("pending") {
            "completed" => VideoJobStatus::Completed {
                video_url: data["video_url"].as_str().unwrap_or_default().to_string(),
            },
            "failed" => VideoJobStatus::Failed {
                reason: data["error"].as_str().unwrap_or("unknown error").to_string(),
            },
            "processing" => VideoJobStatus::Processing,
            _ => VideoJobStatus::Pending,
        };

        Ok(VideoJob {
            job_id,
            status: job_status,
        })
    }

    async fn post_generate(&self, request: &VideoRequest) -> Result<VideoJob, ProviderError> {
        let provider = ProviderKind::Heygen.as_str();
        let response = self
            .http
            .post(format!("{}/v2/video/generate", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .json(&serde_json::json!({
                "title": request.title,
                "video_inputs": [{
                    "character": { "type": "avatar", "avatar_id": request.avatar_id },
                    "voice": { "type": "text", "input_text": request.script },
                }],
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
        self.job_from_response(&body, status)
    }

    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let provider = ProviderKind::Heygen.as_str();
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(ProviderError::from_status(
                provider,
                status,
                "download failed".to_string(),
            ));
        }

        response
            .bytes()
            .await
            .map(|body| body.to_vec())
            .map_err(|e| transport_error(provider, e))
    }

    async fn get_status(&self, job_id: &str) -> Result<VideoJob, ProviderError> {
        let provider = ProviderKind::Heygen.as_str();
        let response = self
            .http
            .get(format!(
                "{}/v1/video_status.get?video_id={}",
                self.base_url, job_id
            ))
            .header("X-Api-Key", &self.api_key)
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
        self.job_from_response(&body, status)
    }
}

#[async_trait]
impl VideoProvider for HeygenProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Heygen
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            channels: vec![Channel::Video],
            batch_limit: None,
            supports_webhooks: true,
            supports_linkedin: false,
            max_generation_time_ms: Some(MAX_GENERATION_TIME_MS),
            polling_interval_ms: Some(POLLING_INTERVAL_MS),
        }
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::Config {
                provider: self.kind().to_string(),
                message: "HEYGEN_API_KEY is not set".to_string(),
            });
        }
        if self.allowed_domains.is_empty() {
            return Err(ProviderError::Config {
                provider: self.kind().to_string(),
                message: "no allowed download domains configured".to_string(),
            });
        }
        Ok(())
    }

    #[instrument(name = "heygen_generate", skip(self, request), fields(avatar = %request.avatar_id))]
    async fn generate_video(&self, request: &VideoRequest) -> Result<VideoJob, ProviderError> {
        if request.script.trim().is_empty() {
            return Err(ProviderError::Validation {
                provider: self.kind().to_string(),
                message: "video script cannot be empty".to_string(),
            });
        }

        guarded_call(&self.breaker, &self.retry, self.kind().as_str(), || {
            self.post_generate(request)
        })
        .await
    }

    #[instrument(name = "heygen_status", skip(self), fields(job_id = %job_id))]
    async fn video_status(&self, job_id: &str) -> Result<VideoJob, ProviderError> {
        guarded_call(&self.breaker, &self.retry, self.kind().as_str(), || {
            self.get_status(job_id)
        })
        .await
    }

    /// Downloads a finished video into the confined download directory.
    ///
    /// Validation order: destination path (traversal + extension) first,
    /// then URL scheme + host allowlist, then the network fetch.
    #[instrument(name = "heygen_download", skip(self), fields(url = %url))]
    async fn download_video(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<PathBuf, ProviderError> {
        let validation_err = |e: crate::security::ValidationError| ProviderError::Validation {
            provider: self.kind().to_string(),
            message: e.to_string(),
        };

        let target = Validator::validate_download_path(&self.download_dir, destination)
            .map_err(validation_err)?;
        Validator::validate_download_url(url, &self.allowed_domains).map_err(validation_err)?;

        let provider = self.kind().as_str();
        let bytes = guarded_call(&self.breaker, &self.retry, provider, || {
            self.fetch_asset(url)
        })
        .await?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::Network {
                    provider: provider.to_string(),
                    message: format!("failed to create download directory: {}", e),
                })?;
        }

        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| ProviderError::Network {
                provider: provider.to_string(),
                message: format!("failed to write video file: {}", e),
            })?;

        info!(path = %target.display(), bytes = bytes.len(), "Video downloaded");
        Ok(target)
    }

    async fn health_check(&self) -> ProviderHealth {
        let started = Instant::now();
        let result = self
            .http
            .get(format!("{}/v1/user/remaining_quota", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("HeyGen health check passed");
                ProviderHealth {
                    healthy: true,
                    latency_ms: Some(started.elapsed().as_millis() as u64),
                    detail: None,
                }
            }
            Ok(response) => {
                warn!(status = %response.status(), "HeyGen health check degraded");
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
