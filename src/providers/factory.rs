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

//! Provider factory.
//!
//! One factory instance owns three cached provider slots (email, LinkedIn,
//! video) and a shared HTTP client. Creation resolves the configured
//! provider name, instantiates the client, runs `validate_config()`, caches
//! the instance and hands out `Arc` clones from then on. `clear_cache()` /
//! `reload()` support tests and configuration reloads.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::config::ProviderSettings;

use super::error::ProviderError;
use super::heygen::HeygenProvider;
use super::lemlist::LemlistProvider;
use super::phantombuster::PhantombusterProvider;
use super::postmark::PostmarkProvider;
use super::provider::{EmailProvider, LinkedInProvider, ProviderKind, VideoProvider};

/// Shared HTTP client request timeout.
const HTTP_TIMEOUT_SECS: u64 = 30;
/// Idle connections kept per host for pooling.
const HTTP_POOL_MAX_IDLE_PER_HOST: usize = 5;

/// Factory with cached provider instances.
pub struct ProviderFactory {
    settings: RwLock<ProviderSettings>,
    http: Arc<reqwest::Client>,
    email: RwLock<Option<Arc<dyn EmailProvider>>>,
    linkedin: RwLock<Option<Arc<dyn LinkedInProvider>>>,
    video: RwLock<Option<Arc<dyn VideoProvider>>>,
}

impl ProviderFactory {
    /// Creates a factory from resolved provider settings.
    pub fn new(settings: ProviderSettings) -> Self {
        let http = Arc::new(
            reqwest::Client::builder()
                .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
                .pool_max_idle_per_host(HTTP_POOL_MAX_IDLE_PER_HOST)
                .build()
                .expect("Failed to create HTTP client"),
        );

        Self {
            settings: RwLock::new(settings),
            http,
            email: RwLock::new(None),
            linkedin: RwLock::new(None),
            video: RwLock::new(None),
        }
    }

    fn api_key(settings: &ProviderSettings, kind: ProviderKind) -> String {
        settings.api_key(kind).unwrap_or_default().to_string()
    }

    fn secret(settings: &ProviderSettings, kind: ProviderKind) -> Option<String> {
        settings.webhook_secret(kind).map(String::from)
    }

    /// Returns the email provider, constructing and caching it on first use.
    #[instrument(name = "factory_email_provider", skip(self))]
    pub async fn email_provider(&self) -> Result<Arc<dyn EmailProvider>, ProviderError> {
        if let Some(cached) = self.email.read().await.clone() {
            return Ok(cached);
        }

        let mut slot = self.email.write().await;
        // Another caller may have filled the slot while we waited
        if let Some(cached) = slot.clone() {
            return Ok(cached);
        }

        let settings = self.settings.read().await;
        let name = settings.email_provider.clone();
        let provider: Arc<dyn EmailProvider> = match name.as_str() {
            "lemlist" => Arc::new(LemlistProvider::new(
                Self::api_key(&settings, ProviderKind::Lemlist),
                Self::secret(&settings, ProviderKind::Lemlist),
                self.http.clone(),
            )),
            "postmark" => Arc::new(PostmarkProvider::new(
                Self::api_key(&settings, ProviderKind::Postmark),
                Self::secret(&settings, ProviderKind::Postmark),
                self.http.clone(),
            )),
            "smartlead" => {
                return Err(ProviderError::Config {
                    provider: name,
                    message: "smartlead is not yet implemented - planned for phase 3".to_string(),
                })
            }
            other => {
                return Err(ProviderError::Config {
                    provider: other.to_string(),
                    message: format!("unknown email provider '{}'", other),
                })
            }
        };

        provider.validate_config()?;
        info!(provider = %name, "Email provider initialized");
        *slot = Some(provider.clone());
        Ok(provider)
    }

    /// Returns the LinkedIn provider, constructing and caching it on first use.
    #[instrument(name = "factory_linkedin_provider", skip(self))]
    pub async fn linkedin_provider(&self) -> Result<Arc<dyn LinkedInProvider>, ProviderError> {
        if let Some(cached) = self.linkedin.read().await.clone() {
            return Ok(cached);
        }

        let mut slot = self.linkedin.write().await;
        if let Some(cached) = slot.clone() {
            return Ok(cached);
        }

        let settings = self.settings.read().await;
        let name = settings.linkedin_provider.clone();
        let provider: Arc<dyn LinkedInProvider> = match name.as_str() {
            "phantombuster" => Arc::new(PhantombusterProvider::new(
                Self::api_key(&settings, ProviderKind::Phantombuster),
                Self::secret(&settings, ProviderKind::Phantombuster),
                self.http.clone(),
            )),
            "lemlist" => {
                return Err(ProviderError::Config {
                    provider: name,
                    message: "lemlist LinkedIn steps are not yet implemented - planned for phase 3"
                        .to_string(),
                })
            }
            other => {
                return Err(ProviderError::Config {
                    provider: other.to_string(),
                    message: format!("unknown linkedin provider '{}'", other),
                })
            }
        };

        provider.validate_config()?;
        info!(provider = %name, "LinkedIn provider initialized");
        *slot = Some(provider.clone());
        Ok(provider)
    }

    /// Returns the video provider, constructing and caching it on first use.
    #[instrument(name = "factory_video_provider", skip(self))]
    pub async fn video_provider(&self) -> Result<Arc<dyn VideoProvider>, ProviderError> {
        if let Some(cached) = self.video.read().await.clone() {
            return Ok(cached);
        }

        let mut slot = self.video.write().await;
        if let Some(cached) = slot.clone() {
            return Ok(cached);
        }

        let settings = self.settings.read().await;
        let name = settings.video_provider.clone();
        let provider: Arc<dyn VideoProvider> = match name.as_str() {
            "heygen" => Arc::new(HeygenProvider::new(
                Self::api_key(&settings, ProviderKind::Heygen),
                Self::secret(&settings, ProviderKind::Heygen),
                settings.video_download_dir.clone(),
                settings.video_allowed_domains.clone(),
                self.http.clone(),
            )),
            "synthesia" => {
                return Err(ProviderError::Config {
                    provider: name,
                    message: "synthesia is not yet implemented - planned for phase 4".to_string(),
                })
            }
            other => {
                return Err(ProviderError::Config {
                    provider: other.to_string(),
                    message: format!("unknown video provider '{}'", other),
                })
            }
        };

        provider.validate_config()?;
        info!(provider = %name, "Video provider initialized");
        *slot = Some(provider.clone());
        Ok(provider)
    }

    /// Drops all cached instances. The next call re-constructs from the
    /// current settings.
    pub async fn clear_cache(&self) {
        *self.email.write().await = None;
        *self.linkedin.write().await = None;
        *self.video.write().await = None;
        info!("Provider cache cleared");
    }

    /// Replaces the settings and clears the cache.
    pub async fn reload(&self, settings: ProviderSettings) {
        *self.settings.write().await = settings;
        self.clear_cache().await;
        info!("Provider settings reloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn settings_with_keys() -> ProviderSettings {
        let mut api_keys = HashMap::new();
        api_keys.insert(ProviderKind::Lemlist, "lm_key".to_string());
        api_keys.insert(ProviderKind::Postmark, "pm_key".to_string());
        api_keys.insert(ProviderKind::Phantombuster, "pb_key".to_string());
        api_keys.insert(ProviderKind::Heygen, "hg_key".to_string());

        ProviderSettings {
            email_provider: "lemlist".to_string(),
            linkedin_provider: "phantombuster".to_string(),
            video_provider: "heygen".to_string(),
            api_keys,
            webhook_secrets: HashMap::new(),
            video_download_dir: PathBuf::from("/tmp/videos"),
            video_allowed_domains: vec!["heygen.com".to_string()],
        }
    }

    #[tokio::test]
    async fn test_email_provider_cached() {
        let factory = ProviderFactory::new(settings_with_keys());

        let first = factory.email_provider().await.unwrap();
        let second = factory.email_provider().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second), "Second call must hit the cache");
        assert_eq!(first.kind(), ProviderKind::Lemlist);
    }

    #[tokio::test]
    async fn test_unknown_provider_name() {
        let mut settings = settings_with_keys();
        settings.email_provider = "sendgrid".to_string();
        let factory = ProviderFactory::new(settings);

        let err = factory.email_provider().await.unwrap_err();
        assert!(matches!(err, ProviderError::Config { .. }));
        assert!(err.to_string().contains("unknown email provider"));
    }

    #[tokio::test]
    async fn test_stubbed_provider_names_phase() {
        let mut settings = settings_with_keys();
        settings.video_provider = "synthesia".to_string();
        let factory = ProviderFactory::new(settings);

        let err = factory.video_provider().await.unwrap_err();
        assert!(err.to_string().contains("planned for phase 4"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_validation() {
        let mut settings = settings_with_keys();
        settings.api_keys.remove(&ProviderKind::Lemlist);
        let factory = ProviderFactory::new(settings);

        let err = factory.email_provider().await.unwrap_err();
        assert!(matches!(err, ProviderError::Config { .. }));

        // Failed construction must not poison the cache
        assert!(factory.email.read().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_cache_reconstructs() {
        let factory = ProviderFactory::new(settings_with_keys());

        let first = factory.email_provider().await.unwrap();
        factory.clear_cache().await;
        let second = factory.email_provider().await.unwrap();
        assert!(
            !Arc::ptr_eq(&first, &second),
            "clear_cache must drop the cached instance"
        );
    }

    #[tokio::test]
    async fn test_reload_switches_provider() {
        let factory = ProviderFactory::new(settings_with_keys());

        let first = factory.email_provider().await.unwrap();
        assert_eq!(first.kind(), ProviderKind::Lemlist);

        let mut settings = settings_with_keys();
        settings.email_provider = "postmark".to_string();
        factory.reload(settings).await;

        let second = factory.email_provider().await.unwrap();
        assert_eq!(second.kind(), ProviderKind::Postmark);
    }

    #[tokio::test]
    async fn test_linkedin_and_video_slots() {
        let factory = ProviderFactory::new(settings_with_keys());

        let linkedin = factory.linkedin_provider().await.unwrap();
        assert_eq!(linkedin.kind(), ProviderKind::Phantombuster);

        let video = factory.video_provider().await.unwrap();
        assert_eq!(video.kind(), ProviderKind::Heygen);
    }
}
