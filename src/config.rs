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

//! Central configuration layer.
//!
//! All environment access happens here, once, at startup. Components
//! receive the slices of configuration they need through constructors and
//! never read env vars at call time.
//!
//! | Variable | Default |
//! |---|---|
//! | `CADENCE_DB_PATH` | `./cadence-db` |
//! | `EMAIL_PROVIDER` | `lemlist` |
//! | `LINKEDIN_PROVIDER` | `phantombuster` |
//! | `VIDEO_PROVIDER` | `heygen` |
//! | `<PROVIDER>_API_KEY` | unset |
//! | `<PROVIDER>_WEBHOOK_SECRET` | unset |
//! | `VIDEO_DOWNLOAD_DIR` | `./videos` |
//! | `VIDEO_ALLOWED_DOMAINS` | `heygen.com,resource.heygen.ai` |
//! | `WEBHOOK_TIMEOUT_SECS` | `5` |

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::providers::ProviderKind;

/// Default reference timeout for webhook ingestion.
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 5;

/// Provider selection and credentials.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Provider tag dispatching the email channel
    pub email_provider: String,
    /// Provider tag dispatching the LinkedIn channel
    pub linkedin_provider: String,
    /// Provider tag dispatching the video channel
    pub video_provider: String,
    pub api_keys: HashMap<ProviderKind, String>,
    pub webhook_secrets: HashMap<ProviderKind, String>,
    /// Directory video downloads are confined to
    pub video_download_dir: PathBuf,
    /// Hosts video downloads may come from
    pub video_allowed_domains: Vec<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            email_provider: "lemlist".to_string(),
            linkedin_provider: "phantombuster".to_string(),
            video_provider: "heygen".to_string(),
            api_keys: HashMap::new(),
            webhook_secrets: HashMap::new(),
            video_download_dir: PathBuf::from("./videos"),
            video_allowed_domains: vec![
                "heygen.com".to_string(),
                "resource.heygen.ai".to_string(),
            ],
        }
    }
}

impl ProviderSettings {
    /// The webhook secret for one provider, if configured.
    pub fn webhook_secret(&self, provider: ProviderKind) -> Option<&str> {
        self.webhook_secrets.get(&provider).map(String::as_str)
    }

    /// The API key for one provider, if configured.
    pub fn api_key(&self, provider: ProviderKind) -> Option<&str> {
        self.api_keys.get(&provider).map(String::as_str)
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    /// Per-call budget for webhook ingestion
    pub webhook_timeout: Duration,
    pub providers: ProviderSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "./cadence-db".to_string(),
            webhook_timeout: Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS),
            providers: ProviderSettings::default(),
        }
    }
}

impl AppConfig {
    /// Resolves configuration from the environment, falling back to the
    /// documented defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = AppConfig::default();

        if let Ok(path) = std::env::var("CADENCE_DB_PATH") {
            config.db_path = path;
        }
        if let Ok(secs) = std::env::var("WEBHOOK_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.webhook_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(provider) = std::env::var("EMAIL_PROVIDER") {
            config.providers.email_provider = provider.to_lowercase();
        }
        if let Ok(provider) = std::env::var("LINKEDIN_PROVIDER") {
            config.providers.linkedin_provider = provider.to_lowercase();
        }
        if let Ok(provider) = std::env::var("VIDEO_PROVIDER") {
            config.providers.video_provider = provider.to_lowercase();
        }

        for kind in [
            ProviderKind::Lemlist,
            ProviderKind::Postmark,
            ProviderKind::Phantombuster,
            ProviderKind::Heygen,
        ] {
            let prefix = kind.as_str().to_uppercase();
            if let Ok(key) = std::env::var(format!("{}_API_KEY", prefix)) {
                config.providers.api_keys.insert(kind, key);
            }
            if let Ok(secret) = std::env::var(format!("{}_WEBHOOK_SECRET", prefix)) {
                config.providers.webhook_secrets.insert(kind, secret);
            }
        }

        if let Ok(dir) = std::env::var("VIDEO_DOWNLOAD_DIR") {
            config.providers.video_download_dir = PathBuf::from(dir);
        }
        if let Ok(domains) = std::env::var("VIDEO_ALLOWED_DOMAINS") {
            config.providers.video_allowed_domains = domains
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }

        config
    }
}
