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

//! Campaign event pipeline.
//!
//! The single entry point for provider webhooks: verify the HMAC over the
//! raw bytes, normalize, resolve the enrollment, and atomically apply the
//! event. Application is idempotent (the dedup key is the event record id)
//! and counter increments are database-side expressions serialized by a
//! per-instance lock, so N concurrent deliveries of the same instance's
//! events land exactly once each with no lost updates.
//!
//! Events that arrive before their enrollment exists are parked on the
//! orphaned-event queue and acknowledged; the provider must see success to
//! stop redelivering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::campaigns::CampaignStore;
use crate::db::DBClient;
use crate::models::{EnrollmentStatus, NormalizedEvent};
use crate::providers::ProviderKind;
use crate::security::{self, SignatureError};

use super::normalizer;
use super::orphan_queue::OrphanedEventQueue;

/// Outcome of an accepted webhook. All variants map to `202 Accepted` at
/// the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestReceipt {
    /// A fresh event row was created and counters were advanced
    Applied { event_id: String },
    /// The event was seen before; the transaction committed with no change
    Duplicate,
    /// No enrollment yet; the event is parked on the orphan queue
    Queued,
    /// Recognized payload carrying an event type the platform does not track
    Ignored,
}

/// Webhook rejection reasons.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no webhook secret configured for {0}")]
    MissingSecret(ProviderKind),

    #[error("missing signature header")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("ingest timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl PipelineError {
    /// The HTTP status the external webhook layer maps this error to.
    /// Signature problems are 401, unparseable payloads 400, and the rest
    /// 5xx so the provider retries.
    pub fn http_status(&self) -> u16 {
        match self {
            PipelineError::MissingSecret(_)
            | PipelineError::MissingSignature
            | PipelineError::InvalidSignature => 401,
            PipelineError::MalformedPayload(_) => 400,
            PipelineError::Timeout(_) => 503,
            PipelineError::Database(_) => 500,
        }
    }
}

/// The campaign event pipeline.
pub struct EventPipeline {
    db: Arc<DBClient>,
    store: Arc<CampaignStore>,
    orphans: Arc<OrphanedEventQueue>,
    webhook_secrets: HashMap<ProviderKind, String>,
    ingest_timeout: Duration,
    /// Per-instance appliers are serialized; the embedded engine has no
    /// `SELECT ... FOR UPDATE`, so this map is the instance row lock.
    instance_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EventPipeline {
    pub fn new(
        db: Arc<DBClient>,
        store: Arc<CampaignStore>,
        orphans: Arc<OrphanedEventQueue>,
        webhook_secrets: HashMap<ProviderKind, String>,
        ingest_timeout: Duration,
    ) -> Self {
        Self {
            db,
            store,
            orphans,
            webhook_secrets,
            ingest_timeout,
            instance_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Ingests one provider webhook.
    ///
    /// `raw_body` must be the exact bytes as transmitted; the HMAC is
    /// byte-sensitive and verification runs before any parsing. Header
    /// lookup is case-insensitive on the provider's signature header.
    #[instrument(name = "ingest_webhook", skip(self, raw_body, headers), fields(provider = %provider, body_len = raw_body.len()))]
    pub async fn ingest_webhook(
        &self,
        provider: ProviderKind,
        raw_body: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<IngestReceipt, PipelineError> {
        let work = self.ingest_inner(provider, raw_body, headers);
        match tokio::time::timeout(self.ingest_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Webhook ingest timed out");
                Err(PipelineError::Timeout(self.ingest_timeout))
            }
        }
    }

    async fn ingest_inner(
        &self,
        provider: ProviderKind,
        raw_body: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<IngestReceipt, PipelineError> {
        // 1. Signature first: no side effects on rejection.
        let secret = self
            .webhook_secrets
            .get(&provider)
            .ok_or(PipelineError::MissingSecret(provider))?;

        let header_name = provider.signature_header();
        let signature = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(header_name))
            .map(|(_, value)| value.as_str())
            .ok_or(PipelineError::MissingSignature)?;

        security::verify_signature(secret, raw_body, signature).map_err(|e| {
            warn!(provider = %provider, error = %e, "Webhook signature rejected");
            match e {
                SignatureError::MissingSignature | SignatureError::MissingSecret => {
                    PipelineError::MissingSignature
                }
                SignatureError::InvalidSignature => PipelineError::InvalidSignature,
            }
        })?;

        // 2. Parse and normalize only after the payload is authenticated.
        let payload: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| PipelineError::MalformedPayload(e.to_string()))?;

        let event = match normalizer::normalize(provider, &payload)
            .map_err(|e| PipelineError::MalformedPayload(e.to_string()))?
        {
            Some(event) => event,
            None => {
                debug!(provider = %provider, "Untracked event type acknowledged");
                return Ok(IngestReceipt::Ignored);
            }
        };

        self.apply_or_queue(event).await
    }

    /// Resolves the enrollment and applies the event, or parks it on the
    /// orphan queue when the enrollment is not there yet. Also the entry
    /// point for orphan retries and dead-letter replays.
    pub async fn apply_or_queue(
        &self,
        mut event: NormalizedEvent,
    ) -> Result<IngestReceipt, PipelineError> {
        let enrollment = match &event.provider_message_id {
            Some(message_id) => self
                .store
                .find_enrollment_by_message(event.channel, message_id)
                .await
                .map_err(|e| PipelineError::Database(anyhow::anyhow!(e)))?,
            // No correlation key at all: it can only resolve if a later
            // retry finds one, which it will not. The queue's retry budget
            // turns it into a dead letter with a reason attached.
            None => None,
        };

        match enrollment {
            Some(enrollment) => {
                event.enrollment_id = Some(enrollment.id.clone());
                event.instance_id = Some(enrollment.instance_id.clone());
                self.apply_event(&event).await
            }
            None => {
                info!(
                    provider = %event.provider,
                    message_id = event.provider_message_id.as_deref().unwrap_or("<none>"),
                    "No enrollment for event; queuing as orphan"
                );
                self.orphans
                    .enqueue(&event)
                    .await
                    .map_err(PipelineError::Database)?;
                Ok(IngestReceipt::Queued)
            }
        }
    }

    /// Atomically applies a resolved event.
    ///
    /// Inside the per-instance lock, one transaction creates the event row
    /// under its deterministic dedup id, bumps exactly one counter with a
    /// database-side `+= 1`, and applies the enrollment transition. A
    /// pre-existing row makes the CREATE fail, the engine cancels the
    /// script, and the call reports `Duplicate` with no counter change.
    #[instrument(name = "apply_event", skip(self, event), fields(event_type = %event.event_type, provider = %event.provider))]
    pub async fn apply_event(
        &self,
        event: &NormalizedEvent,
    ) -> Result<IngestReceipt, PipelineError> {
        let enrollment_id = event
            .enrollment_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("apply_event called without enrollment_id"))?;
        let instance_id = event
            .instance_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("apply_event called without instance_id"))?;

        let lock = self.instance_lock(instance_id).await;
        let _guard = lock.lock().await;

        let event_id = event.dedup_id();

        let mut content_fields = vec![
            "enrollment_id: $enrollment_id",
            "instance_id: $instance_id",
            "event_type: $event_type",
            "channel: $channel",
            "provider: $provider",
            "timestamp: type::datetime($timestamp)",
            "metadata: $metadata",
        ];
        if event.provider_event_id.is_some() {
            content_fields.push("provider_event_id: $provider_event_id");
        }
        if event.step_number.is_some() {
            content_fields.push("step_number: $step_number");
        }

        let mut script = format!(
            "BEGIN TRANSACTION;\n\
             CREATE type::thing('campaign_event', $event_id) CONTENT {{ {} }};\n",
            content_fields.join(", ")
        );

        if let Some(counter) = event.event_type.counter_field() {
            script.push_str(&format!(
                "UPDATE type::thing('campaign_instance', $instance_id) SET {col} = {col} + 1;\n",
                col = counter
            ));
        }

        if let Some(next_status) = EnrollmentStatus::from_event(event.event_type) {
            script.push_str(&format!(
                "UPDATE type::thing('campaign_enrollment', $enrollment_id) SET status = '{}';\n",
                next_status
            ));
        }

        script.push_str("COMMIT TRANSACTION;");

        let mut params = vec![
            ("event_id".to_string(), serde_json::json!(event_id)),
            ("enrollment_id".to_string(), serde_json::json!(enrollment_id)),
            ("instance_id".to_string(), serde_json::json!(instance_id)),
            ("event_type".to_string(), serde_json::json!(event.event_type)),
            ("channel".to_string(), serde_json::json!(event.channel)),
            ("provider".to_string(), serde_json::json!(event.provider)),
            (
                "timestamp".to_string(),
                serde_json::json!(event.timestamp.to_rfc3339()),
            ),
            ("metadata".to_string(), event.metadata.clone()),
        ];
        if let Some(provider_event_id) = &event.provider_event_id {
            params.push((
                "provider_event_id".to_string(),
                serde_json::json!(provider_event_id),
            ));
        }
        if let Some(step_number) = event.step_number {
            params.push(("step_number".to_string(), serde_json::json!(step_number)));
        }

        match self.db.transaction(&script, params).await {
            Ok(()) => {
                info!(event_id = %event_id, "Event applied");
                Ok(IngestReceipt::Applied { event_id })
            }
            Err(e) if e.to_string().contains("already exists") => {
                debug!(event_id = %event_id, "Duplicate event; no counter change");
                Ok(IngestReceipt::Duplicate)
            }
            // Transient database errors roll the transaction back; the
            // provider's redelivery supplies eventual consistency.
            Err(e) => Err(PipelineError::Database(e)),
        }
    }

    async fn instance_lock(&self, instance_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.instance_locks.lock().await;
        locks
            .entry(instance_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Access to the backing client for collaborators (dead-letter replay).
    pub(crate) fn db(&self) -> &Arc<DBClient> {
        &self.db
    }

    /// The campaign store this pipeline resolves enrollments against.
    pub fn store(&self) -> &Arc<CampaignStore> {
        &self.store
    }
}
