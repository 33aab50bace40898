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

//! Circuit breaker for outreach provider APIs.
//!
//! Not every provider error means the provider is down. A 429 or a quota
//! response proves the API is alive and answering; a rejected payload is
//! the caller's bug. Only availability errors (5xx, timeouts, transport
//! failures) count toward tripping the circuit, so a campaign that is
//! merely rate-limited keeps its breaker closed.
//!
//! Outreach providers also tend to flap during incidents, so the cooldown
//! escalates: each consecutive trip doubles the wait before the next
//! half-open probe, up to a ceiling. A full recovery (the probe quota is
//! met) resets the escalation.
//!
//! The breaker wraps the *retry-wrapped* call: when it is open, no retry
//! is attempted at all.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::error::ProviderError;

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive availability failures before the circuit trips
    pub failure_threshold: u32,
    /// Cooldown after the first trip; doubles on each consecutive trip
    pub base_cooldown: Duration,
    /// Ceiling on the escalated cooldown
    pub max_cooldown: Duration,
    /// Half-open probes that must succeed before the circuit closes
    pub probe_quota: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            base_cooldown: Duration::from_secs(60),
            max_cooldown: Duration::from_secs(15 * 60),
            probe_quota: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Defaults tuned for outreach provider APIs: trip fast, probe after a
    /// short first cooldown, back off hard if the provider keeps flapping.
    /// Per-provider overrides come from the factory config.
    pub fn for_outreach_provider() -> Self {
        Self {
            failure_threshold: 3,
            base_cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(8 * 60),
            probe_quota: 1,
        }
    }

    fn cooldown_after(&self, trips: u32) -> Duration {
        // trips is at least 1 once the circuit has opened
        let factor = 1u32 << (trips.saturating_sub(1)).min(10);
        self.base_cooldown
            .saturating_mul(factor)
            .min(self.max_cooldown)
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
            CircuitState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Internal phase, carrying the data that only exists in that phase.
#[derive(Debug)]
enum Phase {
    Closed {
        failure_streak: u32,
    },
    Open {
        tripped_at: Instant,
        /// Consecutive trips without a full recovery; drives escalation
        trips: u32,
    },
    HalfOpen {
        probe_successes: u32,
        trips: u32,
    },
}

impl Phase {
    fn state(&self) -> CircuitState {
        match self {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

/// Per-provider circuit breaker.
///
/// Thread-safe; clones share state through the inner `Arc<RwLock>`, so one
/// breaker instance guards all concurrent callers of a provider.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    phase: Arc<RwLock<Phase>>,
    provider_name: String,
}

/// Whether an error indicates the provider itself is unavailable.
///
/// Rate limits, quota exhaustion and request-shaped errors (validation,
/// config, webhook verification, non-408 4xx) are answered requests; they
/// must not trip the circuit.
fn is_availability_failure(error: &ProviderError) -> bool {
    match error {
        ProviderError::Timeout { .. } | ProviderError::Network { .. } => true,
        ProviderError::Api { status, .. } => *status == 408 || *status >= 500,
        _ => false,
    }
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig, provider_name: String) -> Self {
        Self {
            config,
            phase: Arc::new(RwLock::new(Phase::Closed { failure_streak: 0 })),
            provider_name,
        }
    }

    /// Current observable state.
    pub async fn state(&self) -> CircuitState {
        self.phase.read().await.state()
    }

    /// Whether a request may go out right now.
    ///
    /// An open circuit whose escalated cooldown has elapsed flips to
    /// half-open here and lets the probe through.
    pub async fn allows_request(&self) -> bool {
        let mut phase = self.phase.write().await;

        match &*phase {
            Phase::Closed { .. } | Phase::HalfOpen { .. } => true,
            Phase::Open { tripped_at, trips } => {
                let cooldown = self.config.cooldown_after(*trips);
                if tripped_at.elapsed() < cooldown {
                    return false;
                }
                info!(
                    provider = %self.provider_name,
                    trips = *trips,
                    cooldown_secs = cooldown.as_secs(),
                    "Circuit breaker half-open; probing provider"
                );
                *phase = Phase::HalfOpen {
                    probe_successes: 0,
                    trips: *trips,
                };
                true
            }
        }
    }

    /// Records a successful call.
    pub async fn record_success(&self) {
        let mut phase = self.phase.write().await;

        match &mut *phase {
            Phase::Closed { failure_streak } => {
                if *failure_streak > 0 {
                    debug!(provider = %self.provider_name, "Failure streak cleared");
                    *failure_streak = 0;
                }
            }
            Phase::HalfOpen {
                probe_successes, ..
            } => {
                *probe_successes += 1;
                if *probe_successes >= self.config.probe_quota {
                    info!(provider = %self.provider_name, "Circuit breaker closed after recovery");
                    // Full recovery also resets the cooldown escalation.
                    *phase = Phase::Closed { failure_streak: 0 };
                }
            }
            Phase::Open { .. } => {
                // A racing success landed after the trip; the probe cycle
                // will confirm recovery.
            }
        }
    }

    /// Records a failed call, counting it only if it signals the provider
    /// is unavailable.
    pub async fn record_error(&self, error: &ProviderError) {
        if !is_availability_failure(error) {
            debug!(
                provider = %self.provider_name,
                error = %error.name(),
                "Error does not count toward the circuit"
            );
            return;
        }

        let mut phase = self.phase.write().await;

        match &mut *phase {
            Phase::Closed { failure_streak } => {
                *failure_streak += 1;
                if *failure_streak >= self.config.failure_threshold {
                    warn!(
                        provider = %self.provider_name,
                        streak = *failure_streak,
                        "Circuit breaker tripped"
                    );
                    *phase = Phase::Open {
                        tripped_at: Instant::now(),
                        trips: 1,
                    };
                }
            }
            Phase::HalfOpen { trips, .. } => {
                let trips = *trips + 1;
                warn!(
                    provider = %self.provider_name,
                    trips,
                    next_cooldown_secs = self.config.cooldown_after(trips).as_secs(),
                    "Probe failed; circuit breaker re-tripped with escalated cooldown"
                );
                *phase = Phase::Open {
                    tripped_at: Instant::now(),
                    trips,
                };
            }
            Phase::Open { tripped_at, .. } => {
                // A straggler failure while open extends the window.
                *tripped_at = Instant::now();
            }
        }
    }

    /// Resets to closed. Manual intervention / test hook.
    pub async fn reset(&self) {
        let mut phase = self.phase.write().await;
        info!(
            provider = %self.provider_name,
            previous_state = %phase.state(),
            "Circuit breaker manually reset"
        );
        *phase = Phase::Closed { failure_streak: 0 };
    }
}
