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

//! Guarded provider calls: circuit breaker composed outside retry.
//!
//! Composition order is load-bearing. The breaker check happens before the
//! retry loop, so an open circuit fails fast with `Unavailable` and never
//! burns the backoff schedule against a provider that is known to be down.
//! The breaker records one outcome per *guarded call*, not per retry
//! attempt, and the breaker itself decides which errors count against the
//! circuit.

use std::future::Future;

use super::circuit_breaker::CircuitBreaker;
use super::error::ProviderError;
use super::retry::{with_retry, RetryConfig};

/// Runs `operation` through retry, gated by the provider's circuit breaker.
pub async fn guarded_call<F, T, Fut>(
    breaker: &CircuitBreaker,
    retry_config: &RetryConfig,
    provider_name: &str,
    operation: F,
) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    if !breaker.allows_request().await {
        return Err(ProviderError::Unavailable {
            provider: provider_name.to_string(),
        });
    }

    match with_retry(operation, retry_config).await {
        Ok(result) => {
            breaker.record_success().await;
            Ok(result)
        }
        Err(error) => {
            breaker.record_error(&error).await;
            Err(error)
        }
    }
}
