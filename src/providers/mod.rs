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

//! # Provider Abstraction Layer
//!
//! Uniform, capability-scoped access to the external outreach providers
//! (Lemlist, Postmark, Phantombuster, HeyGen), hiding their HTTP, auth,
//! error and retry concerns.
//!
//! Every outbound call is guarded: a per-provider circuit breaker wraps the
//! retry loop (breaker outside retry), so a down provider fails fast while
//! transient errors back off 1-2-4-8-16 seconds.

pub mod circuit_breaker;
pub mod error;
pub mod factory;
pub mod guard;
pub mod heygen;
pub mod lemlist;
pub mod phantombuster;
pub mod postmark;
pub mod provider;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::ProviderError;
pub use factory::ProviderFactory;
pub use guard::guarded_call;
pub use provider::{
    ConnectionRequest, DispatchReceipt, EmailMessage, EmailProvider, LinkedInMessage,
    LinkedInProvider, ProviderCapabilities, ProviderHealth, ProviderKind, RateLimitStatus,
    VideoJob, VideoJobStatus, VideoProvider, VideoRequest,
};
pub use retry::{with_retry, RetryConfig};
