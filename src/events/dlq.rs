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

//! Dead-letter administration.
//!
//! Events that exhausted their orphan retries land here with the
//! normalized payload preserved, waiting for an operator. Replay walks
//! `failed -> replaying -> replayed` and pushes the payload back through
//! the pipeline's apply/orphan path; a replay whose enrollment is still
//! missing re-enters the orphan queue and counts as replayed.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::{queries, DBClient};
use crate::models::{DeadLetterEvent, DeadLetterStatus, NormalizedEvent};

use super::pipeline::{EventPipeline, IngestReceipt};

/// Filter for listing dead letters.
#[derive(Debug, Clone, Default)]
pub struct DlqFilter {
    pub provider: Option<String>,
    pub status: Option<DeadLetterStatus>,
}

/// Result of replaying one dead letter.
#[derive(Debug)]
pub struct ReplayReport {
    pub id: String,
    pub replayed: bool,
    pub detail: String,
}

/// Store for dead-lettered events.
pub struct DeadLetterStore {
    db: Arc<DBClient>,
}

impl DeadLetterStore {
    pub fn new(db: Arc<DBClient>) -> Self {
        Self { db }
    }

    /// Writes a dead letter for an orphan that exhausted its retries.
    #[instrument(name = "dlq_record_orphan", skip(self, event), fields(provider = %event.provider))]
    pub async fn record_orphan_exhausted(
        &self,
        event: &NormalizedEvent,
        retries: u32,
    ) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        self.db
            .create(
                "dead_letter_event",
                &id,
                serde_json::json!({
                    "provider": event.provider,
                    "payload": serde_json::to_value(event)?,
                    "failure_reason": format!(
                        "enrollment not found after {} retries (message_id: {})",
                        retries,
                        event.provider_message_id.as_deref().unwrap_or("<none>")
                    ),
                    "status": DeadLetterStatus::Failed,
                }),
            )
            .await?;

        warn!(dlq_id = %id, "Orphaned event dead-lettered");
        Ok(id)
    }

    /// Lists dead letters, newest first.
    #[instrument(name = "dlq_list", skip(self))]
    pub async fn list(&self, filter: &DlqFilter) -> anyhow::Result<Vec<DeadLetterEvent>> {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(provider) = &filter.provider {
            clauses.push("provider = $provider");
            params.push(("provider".to_string(), serde_json::json!(provider)));
        }
        if let Some(status) = &filter.status {
            clauses.push("status = $status");
            params.push(("status".to_string(), serde_json::json!(status)));
        }

        let query = if clauses.is_empty() {
            format!("{} ORDER BY created_at DESC", queries::dlq::SELECT_BASE)
        } else {
            format!(
                "{} WHERE {} ORDER BY created_at DESC",
                queries::dlq::SELECT_BASE,
                clauses.join(" AND ")
            )
        };

        let rows = self.db.query_json_with_params(&query, params).await?;
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DeadLetterEvent>, _>>()
            .map_err(|e| anyhow::anyhow!("deserialization failed: {}", e))
    }

    /// Loads one dead letter.
    async fn get(&self, id: &str) -> anyhow::Result<Option<DeadLetterEvent>> {
        let rows = self
            .db
            .query_json_with_params(
                &format!(
                    "{} WHERE meta::id(id) = $id",
                    queries::dlq::SELECT_BASE
                ),
                vec![("id".to_string(), serde_json::json!(id))],
            )
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()?)
    }

    async fn set_status(&self, id: &str, status: DeadLetterStatus) -> anyhow::Result<()> {
        let stamp = if status == DeadLetterStatus::Replayed {
            ", replayed_at = time::now()"
        } else {
            ""
        };
        self.db
            .execute_with_params(
                &format!(
                    "UPDATE type::thing('dead_letter_event', $id) SET status = $status{}",
                    stamp
                ),
                vec![
                    ("id".to_string(), serde_json::json!(id)),
                    ("status".to_string(), serde_json::json!(status)),
                ],
            )
            .await
    }

    /// Replays dead letters through the pipeline.
    #[instrument(name = "dlq_replay", skip(self, pipeline), fields(count = ids.len()))]
    pub async fn replay(
        &self,
        ids: &[String],
        pipeline: &EventPipeline,
    ) -> anyhow::Result<Vec<ReplayReport>> {
        let mut reports = Vec::with_capacity(ids.len());

        for id in ids {
            let entry = match self.get(id).await? {
                Some(entry) => entry,
                None => {
                    reports.push(ReplayReport {
                        id: id.clone(),
                        replayed: false,
                        detail: "not found".to_string(),
                    });
                    continue;
                }
            };

            if entry.status == DeadLetterStatus::Replaying {
                reports.push(ReplayReport {
                    id: id.clone(),
                    replayed: false,
                    detail: "replay already in progress".to_string(),
                });
                continue;
            }

            let event: NormalizedEvent = match serde_json::from_value(entry.payload.clone()) {
                Ok(event) => event,
                Err(e) => {
                    reports.push(ReplayReport {
                        id: id.clone(),
                        replayed: false,
                        detail: format!("payload no longer parseable: {}", e),
                    });
                    continue;
                }
            };

            self.set_status(id, DeadLetterStatus::Replaying).await?;

            match pipeline.apply_or_queue(event).await {
                Ok(receipt) => {
                    self.set_status(id, DeadLetterStatus::Replayed).await?;
                    let detail = match receipt {
                        IngestReceipt::Applied { event_id } => format!("applied as {}", event_id),
                        IngestReceipt::Duplicate => "already applied".to_string(),
                        IngestReceipt::Queued => "re-queued as orphan".to_string(),
                        IngestReceipt::Ignored => "ignored".to_string(),
                    };
                    info!(dlq_id = %id, detail = %detail, "Dead letter replayed");
                    reports.push(ReplayReport {
                        id: id.clone(),
                        replayed: true,
                        detail,
                    });
                }
                Err(e) => {
                    // Put it back so the operator can retry later.
                    self.set_status(id, DeadLetterStatus::Failed).await?;
                    warn!(dlq_id = %id, error = %e, "Dead letter replay failed");
                    reports.push(ReplayReport {
                        id: id.clone(),
                        replayed: false,
                        detail: e.to_string(),
                    });
                }
            }
        }

        Ok(reports)
    }
}
