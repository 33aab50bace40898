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

//! Provider error taxonomy.
//!
//! Every failure a provider call can surface maps onto one of these
//! variants, giving callers enough structure for automated classification
//! (retry vs fail-fast) without leaking credentials. All variants serialize
//! to JSON as `{name, message, provider, timestamp, ...extras}`.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced from provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider misconfigured or not available in this deployment
    #[error("[{provider}] configuration error: {message}")]
    Config { provider: String, message: String },

    /// Provider rate limit hit
    #[error("[{provider}] rate limited (limit {limit}), resets at {reset_at}")]
    RateLimited {
        provider: String,
        limit: u32,
        reset_at: DateTime<Utc>,
    },

    /// Webhook signature could not be verified
    #[error("[{provider}] webhook verification failed: {message}")]
    WebhookVerification { provider: String, message: String },

    /// Provider API returned an error response
    #[error("[{provider}] API error (status {status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    /// Request payload rejected before dispatch
    #[error("[{provider}] validation failed: {message}")]
    Validation { provider: String, message: String },

    /// Account-level quota exhausted (not a transient rate limit)
    #[error("[{provider}] quota exceeded: {message}")]
    QuotaExceeded { provider: String, message: String },

    /// Request timed out
    #[error("[{provider}] request timed out after {elapsed_ms}ms")]
    Timeout { provider: String, elapsed_ms: u64 },

    /// Circuit breaker is open
    #[error("[{provider}] temporarily unavailable (circuit open)")]
    Unavailable { provider: String },

    /// Transport-level failure
    #[error("[{provider}] network error: {message}")]
    Network { provider: String, message: String },
}

impl ProviderError {
    /// Stable error name used in serialized form and log fields.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderError::Config { .. } => "ProviderConfigError",
            ProviderError::RateLimited { .. } => "RateLimitError",
            ProviderError::WebhookVerification { .. } => "WebhookVerificationError",
            ProviderError::Api { .. } => "ProviderApiError",
            ProviderError::Validation { .. } => "ProviderValidationError",
            ProviderError::QuotaExceeded { .. } => "QuotaExceededError",
            ProviderError::Timeout { .. } => "ProviderTimeoutError",
            ProviderError::Unavailable { .. } => "ProviderUnavailableError",
            ProviderError::Network { .. } => "ProviderError",
        }
    }

    /// The provider tag the error originated from.
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Config { provider, .. }
            | ProviderError::RateLimited { provider, .. }
            | ProviderError::WebhookVerification { provider, .. }
            | ProviderError::Api { provider, .. }
            | ProviderError::Validation { provider, .. }
            | ProviderError::QuotaExceeded { provider, .. }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::Unavailable { provider }
            | ProviderError::Network { provider, .. } => provider,
        }
    }

    /// Whether the retry wrapper should attempt the call again.
    ///
    /// Retryable: rate limits (408/429 map here), 5xx API responses,
    /// timeouts and network failures. Everything else is terminal; an open
    /// circuit in particular must fail fast without retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout { .. }
            | ProviderError::Network { .. } => true,
            ProviderError::Api { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// Maps an HTTP status + body into the right variant.
    pub fn from_status(provider: &str, status: u16, body: String) -> Self {
        match status {
            429 => ProviderError::RateLimited {
                provider: provider.to_string(),
                limit: 0,
                reset_at: Utc::now(),
            },
            402 => ProviderError::QuotaExceeded {
                provider: provider.to_string(),
                message: body,
            },
            _ => ProviderError::Api {
                provider: provider.to_string(),
                status,
                body,
            },
        }
    }

    /// Serializes to the wire form consumed by the admin surface and logs:
    /// `{name, message, provider, timestamp, ...extras}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = serde_json::json!({
            "name": self.name(),
            "message": self.to_string(),
            "provider": self.provider(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        match self {
            ProviderError::RateLimited { limit, reset_at, .. } => {
                json["limit"] = serde_json::json!(limit);
                json["resetAt"] = serde_json::json!(reset_at.to_rfc3339());
            }
            ProviderError::Api { status, body, .. } => {
                json["status"] = serde_json::json!(status);
                json["body"] = serde_json::json!(body);
            }
            ProviderError::Timeout { elapsed_ms, .. } => {
                json["elapsedMs"] = serde_json::json!(elapsed_ms);
            }
            _ => {}
        }

        json
    }
}

/// Attaches the provider tag to transport errors coming out of reqwest.
pub fn transport_error(provider: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
            elapsed_ms: 0,
        }
    } else {
        ProviderError::Network {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let rate = ProviderError::RateLimited {
            provider: "lemlist".to_string(),
            limit: 100,
            reset_at: Utc::now(),
        };
        assert!(rate.is_retryable());

        let timeout = ProviderError::Timeout {
            provider: "lemlist".to_string(),
            elapsed_ms: 5000,
        };
        assert!(timeout.is_retryable());

        let server = ProviderError::Api {
            provider: "postmark".to_string(),
            status: 503,
            body: "unavailable".to_string(),
        };
        assert!(server.is_retryable());

        let request_timeout = ProviderError::Api {
            provider: "postmark".to_string(),
            status: 408,
            body: String::new(),
        };
        assert!(request_timeout.is_retryable());
    }

    #[test]
    fn test_non_retryable_classification() {
        let bad_request = ProviderError::Api {
            provider: "lemlist".to_string(),
            status: 400,
            body: "bad request".to_string(),
        };
        assert!(!bad_request.is_retryable());

        let unauthorized = ProviderError::Api {
            provider: "lemlist".to_string(),
            status: 401,
            body: String::new(),
        };
        assert!(!unauthorized.is_retryable());

        let config = ProviderError::Config {
            provider: "heygen".to_string(),
            message: "missing api key".to_string(),
        };
        assert!(!config.is_retryable());

        // Circuit-open failures must not be retried
        let open = ProviderError::Unavailable {
            provider: "lemlist".to_string(),
        };
        assert!(!open.is_retryable());
    }

    #[test]
    fn test_from_status_mapping() {
        let err = ProviderError::from_status("lemlist", 429, "slow down".to_string());
        assert!(matches!(err, ProviderError::RateLimited { .. }));

        let err = ProviderError::from_status("lemlist", 402, "plan exhausted".to_string());
        assert!(matches!(err, ProviderError::QuotaExceeded { .. }));

        let err = ProviderError::from_status("lemlist", 500, "boom".to_string());
        assert!(matches!(err, ProviderError::Api { status: 500, .. }));
    }

    #[test]
    fn test_json_serialization_shape() {
        let err = ProviderError::Api {
            provider: "postmark".to_string(),
            status: 422,
            body: "invalid recipient".to_string(),
        };
        let json = err.to_json();

        assert_eq!(json["name"], "ProviderApiError");
        assert_eq!(json["provider"], "postmark");
        assert_eq!(json["status"], 422);
        assert!(json["timestamp"].is_string());
        assert!(json["message"].as_str().unwrap().contains("422"));
    }

    #[test]
    fn test_rate_limit_extras() {
        let reset = Utc::now();
        let err = ProviderError::RateLimited {
            provider: "lemlist".to_string(),
            limit: 250,
            reset_at: reset,
        };
        let json = err.to_json();
        assert_eq!(json["limit"], 250);
        assert_eq!(json["resetAt"], reset.to_rfc3339());
    }
}
