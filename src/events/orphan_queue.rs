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

//! Orphaned event queue.
//!
//! When a webhook outruns the outbound dispatcher's commit, its event has
//! no enrollment to attach to. Entries are held durably in the
//! `orphaned_event` table with delayed visibility (`due_at`) and retried on
//! the schedule 1 s, 5 s, 30 s, 5 min; a 4th failed lookup dead-letters the
//! entry.
//!
//! The queue performs no I/O at construction. `start()` lazily spawns the
//! single background processor; `shutdown()` is the three-step teardown:
//! stop polling, drain due entries under a deadline, release the worker.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::db::{queries, DBClient};
use crate::models::{NormalizedEvent, OrphanedEvent};

use super::dlq::DeadLetterStore;
use super::pipeline::EventPipeline;

/// Queue tuning. Defaults implement the production schedule; tests shrink
/// every duration.
#[derive(Debug, Clone)]
pub struct OrphanQueueConfig {
    /// Processor wake-up cadence
    pub poll_interval: Duration,
    /// Delay before attempt N+1; the schedule's length is the retry budget
    pub backoff: Vec<Duration>,
    /// Wall-clock budget for the shutdown drain
    pub drain_budget: Duration,
}

impl Default for OrphanQueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(30),
                Duration::from_secs(300),
            ],
            drain_budget: Duration::from_secs(30),
        }
    }
}

/// Health surface consumed by `/health`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueHealth {
    pub healthy: bool,
    pub pending_count: u64,
    pub last_processed_at: Option<DateTime<Utc>>,
}

/// Durable delayed-retry queue for orphaned events.
pub struct OrphanedEventQueue {
    db: Arc<DBClient>,
    dlq: Arc<DeadLetterStore>,
    config: OrphanQueueConfig,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    last_processed_at: RwLock<Option<DateTime<Utc>>>,
    healthy: AtomicBool,
}

/// SurrealQL duration literal for a delay.
fn duration_literal(duration: Duration) -> String {
    if duration.subsec_millis() != 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}s", duration.as_secs())
    }
}

impl OrphanedEventQueue {
    /// Creates the queue. No connection is opened and no task is spawned
    /// here; the store handle is injected and the processor starts on
    /// `start()`.
    pub fn new(db: Arc<DBClient>, dlq: Arc<DeadLetterStore>, config: OrphanQueueConfig) -> Self {
        Self {
            db,
            dlq,
            config,
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
            last_processed_at: RwLock::new(None),
            healthy: AtomicBool::new(true),
        }
    }

    /// Parks a normalized event until its enrollment appears.
    ///
    /// The entry becomes visible after the first backoff step (1 s in
    /// production).
    #[instrument(name = "orphan_enqueue", skip(self, event), fields(provider = %event.provider))]
    pub async fn enqueue(&self, event: &NormalizedEvent) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        let first_delay = duration_literal(self.config.backoff[0]);

        self.db
            .execute_with_params(
                &format!(
                    "CREATE type::thing('orphaned_event', $id) CONTENT {{ \
                        event: $event, \
                        retry_count: 0, \
                        due_at: time::now() + {} \
                     }}",
                    first_delay
                ),
                vec![
                    ("id".to_string(), serde_json::json!(id)),
                    ("event".to_string(), serde_json::to_value(event)?),
                ],
            )
            .await?;

        info!(orphan_id = %id, "Event parked on orphan queue");
        Ok(id)
    }

    /// Lazily starts the single background processor. Idempotent.
    pub async fn start(self: Arc<Self>, pipeline: Arc<EventPipeline>) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }

        let queue = Arc::clone(&self);
        let cancel = self.cancel.clone();
        let poll_interval = self.config.poll_interval;

        *worker = Some(tokio::spawn(async move {
            info!(poll_interval_ms = poll_interval.as_millis() as u64, "Orphan processor started");
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match queue.process_due(&pipeline).await {
                            Ok(processed) => {
                                queue.healthy.store(true, Ordering::Relaxed);
                                if processed > 0 {
                                    debug!(processed, "Orphan poll cycle finished");
                                }
                            }
                            Err(e) => {
                                queue.healthy.store(false, Ordering::Relaxed);
                                warn!(error = %e, "Orphan poll cycle failed");
                            }
                        }
                    }
                }
            }
            info!("Orphan processor stopped");
        }));
    }

    /// Processes every entry whose visibility timestamp has passed.
    ///
    /// Also the drain function used at shutdown: same lookup, same apply
    /// path, same dead-letter handling.
    pub async fn process_due(&self, pipeline: &EventPipeline) -> anyhow::Result<usize> {
        let rows = self.db.query_json(queries::orphan::SELECT_DUE).await?;
        let entries = rows
            .into_iter()
            .map(serde_json::from_value::<OrphanedEvent>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("orphan entry deserialization failed: {}", e))?;

        let count = entries.len();
        for entry in entries {
            self.process_entry(entry, pipeline).await;
        }

        *self.last_processed_at.write().await = Some(Utc::now());
        Ok(count)
    }

    async fn process_entry(&self, entry: OrphanedEvent, pipeline: &EventPipeline) {
        let mut event = entry.event.clone();

        let enrollment = match &event.provider_message_id {
            Some(message_id) => pipeline
                .store()
                .find_enrollment_by_message(event.channel, message_id)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        match enrollment {
            Some(enrollment) => {
                event.enrollment_id = Some(enrollment.id.clone());
                event.instance_id = Some(enrollment.instance_id.clone());

                match pipeline.apply_event(&event).await {
                    Ok(_) => {
                        debug!(orphan_id = %entry.id, "Orphan resolved and applied");
                        self.delete_entry(&entry.id).await;
                    }
                    Err(e) => {
                        // Transient apply failure: the entry stays due and
                        // the next cycle retries it without burning a
                        // lookup attempt.
                        warn!(orphan_id = %entry.id, error = %e, "Orphan apply failed; will retry");
                    }
                }
            }
            None => {
                let retries = entry.retry_count + 1;
                if retries as usize >= self.config.backoff.len() {
                    if let Err(e) = self
                        .dlq
                        .record_orphan_exhausted(&entry.event, retries)
                        .await
                    {
                        warn!(orphan_id = %entry.id, error = %e, "Failed to dead-letter orphan");
                        return; // keep the entry rather than lose the event
                    }
                    self.delete_entry(&entry.id).await;
                } else {
                    let next_delay = duration_literal(self.config.backoff[retries as usize]);
                    let update = format!(
                        "UPDATE type::thing('orphaned_event', $id) SET \
                         retry_count = {}, due_at = time::now() + {}",
                        retries, next_delay
                    );
                    if let Err(e) = self
                        .db
                        .execute_with_params(
                            &update,
                            vec![("id".to_string(), serde_json::json!(entry.id))],
                        )
                        .await
                    {
                        warn!(orphan_id = %entry.id, error = %e, "Failed to reschedule orphan");
                    } else {
                        debug!(orphan_id = %entry.id, retries, "Orphan rescheduled");
                    }
                }
            }
        }
    }

    async fn delete_entry(&self, id: &str) {
        if let Err(e) = self.db.delete(&format!("orphaned_event:{}", id)).await {
            warn!(orphan_id = %id, error = %e, "Failed to delete orphan entry");
        }
    }

    /// Graceful teardown: stop accepting polling cycles, drain due entries
    /// within the budget, release the worker. Entries not yet due stay in
    /// the table for the next process instance. Safe to call from any
    /// shutdown path, repeatedly.
    #[instrument(name = "orphan_shutdown", skip_all)]
    pub async fn shutdown(&self, pipeline: &EventPipeline) {
        self.cancel.cancel();

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "Orphan processor join failed");
            }
        }

        match tokio::time::timeout(self.config.drain_budget, self.process_due(pipeline)).await {
            Ok(Ok(drained)) => info!(drained, "Orphan queue drained"),
            Ok(Err(e)) => warn!(error = %e, "Orphan drain failed"),
            Err(_) => warn!(
                budget_secs = self.config.drain_budget.as_secs(),
                "Orphan drain exceeded its budget; remaining entries stay queued"
            ),
        }
    }

    /// Health surface: `{healthy, pending_count, last_processed_at}`.
    pub async fn health(&self) -> QueueHealth {
        let pending_count = match self.db.query_json(queries::orphan::COUNT_PENDING).await {
            Ok(rows) => rows
                .first()
                .and_then(|row| row["pending"].as_u64())
                .unwrap_or(0),
            Err(_) => 0,
        };

        QueueHealth {
            healthy: self.healthy.load(Ordering::Relaxed),
            pending_count,
            last_processed_at: *self.last_processed_at.read().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_schedule() {
        let config = OrphanQueueConfig::default();
        let secs: Vec<u64> = config.backoff.iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![1, 5, 30, 300]);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.drain_budget, Duration::from_secs(30));
    }

    #[test]
    fn test_duration_literal() {
        assert_eq!(duration_literal(Duration::from_secs(5)), "5s");
        assert_eq!(duration_literal(Duration::from_secs(300)), "300s");
        assert_eq!(duration_literal(Duration::from_millis(50)), "50ms");
    }
}
