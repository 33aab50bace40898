// Copyright 2025 Cadence Labs
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the campaign event pipeline.
//!
//! Covers the end-to-end behaviors the platform guarantees: idempotent
//! ingestion, counter correctness under concurrency, orphan parking and
//! resolution, dead-lettering after retry exhaustion, and admin replay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;

use cadence_core::campaigns::CampaignStore;
use cadence_core::db::DBClient;
use cadence_core::events::{
    DeadLetterStore, DlqFilter, EventPipeline, IngestReceipt, OrphanQueueConfig,
    OrphanedEventQueue,
};
use cadence_core::models::{
    CampaignType, Channel, DeadLetterStatus, EventType, PathType, TemplateStep,
};
use cadence_core::providers::ProviderKind;
use cadence_core::security;

const SECRET: &str = "whsec_integration";

struct Harness {
    _temp: tempfile::TempDir,
    db: Arc<DBClient>,
    store: Arc<CampaignStore>,
    dlq: Arc<DeadLetterStore>,
    queue: Arc<OrphanedEventQueue>,
    pipeline: Arc<EventPipeline>,
    instance_id: String,
}

/// Builds a full pipeline against a temp database. Orphan backoff is
/// compressed to milliseconds so retry exhaustion happens inside a test
/// budget; the schedule shape (4 steps, then DLQ) is the production one.
async fn setup(backoff_ms: [u64; 4]) -> Harness {
    let temp = tempdir().expect("Failed to create temp dir");
    let db_path = temp.path().join("event_integration_db");
    let db = Arc::new(
        DBClient::new(db_path.to_str().unwrap())
            .await
            .expect("DB init failed"),
    );
    db.initialize_schema().await.expect("Schema init failed");

    let store = Arc::new(CampaignStore::new(db.clone()));
    let dlq = Arc::new(DeadLetterStore::new(db.clone()));
    let queue = Arc::new(OrphanedEventQueue::new(
        db.clone(),
        dlq.clone(),
        OrphanQueueConfig {
            poll_interval: Duration::from_millis(50),
            backoff: backoff_ms.iter().map(|ms| Duration::from_millis(*ms)).collect(),
            drain_budget: Duration::from_secs(5),
        },
    ));

    let mut secrets = HashMap::new();
    secrets.insert(ProviderKind::Lemlist, SECRET.to_string());
    secrets.insert(ProviderKind::Postmark, SECRET.to_string());

    let pipeline = Arc::new(EventPipeline::new(
        db.clone(),
        store.clone(),
        queue.clone(),
        secrets,
        Duration::from_secs(5),
    ));

    let template_id = store
        .create_template(
            "acct_1",
            "Integration sequence",
            CampaignType::Email,
            PathType::Structured,
            vec![TemplateStep {
                step_number: 1,
                channel: Channel::Email,
                action: "send_email".to_string(),
                delay_hours: 0,
                settings: serde_json::json!({}),
            }],
            serde_json::json!({}),
        )
        .await
        .expect("template create failed");
    let instance_id = store
        .create_instance(&template_id, "acct_1", "Integration instance", "lemlist")
        .await
        .expect("instance create failed");

    Harness {
        _temp: temp,
        db,
        store,
        dlq,
        queue,
        pipeline,
        instance_id,
    }
}

fn lemlist_webhook(event_id: &str, event_type: &str, message_id: &str) -> (Vec<u8>, HashMap<String, String>) {
    let body = serde_json::to_vec(&serde_json::json!({
        "_id": event_id,
        "type": event_type,
        "messageId": message_id,
        "date": chrono::Utc::now().to_rfc3339(),
    }))
    .unwrap();

    let mut headers = HashMap::new();
    headers.insert(
        "X-Lemlist-Signature".to_string(),
        security::compute_signature(SECRET, &body),
    );
    (body, headers)
}

async fn enroll_dispatched(h: &Harness, email: &str, message_id: &str) -> String {
    let enrollment_id = h
        .store
        .enroll(&h.instance_id, email, serde_json::json!({}), Channel::Email)
        .await
        .expect("enroll failed");
    h.store
        .mark_dispatched(&enrollment_id, message_id)
        .await
        .expect("mark_dispatched failed");
    enrollment_id
}

async fn event_row_count(h: &Harness) -> usize {
    h.db.query_json("SELECT meta::id(id) AS id FROM campaign_event")
        .await
        .expect("event query failed")
        .len()
}

mod idempotency {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_delivery_counts_once() {
        let h = setup([20, 20, 20, 20]).await;
        let enrollment_id = enroll_dispatched(&h, "ada@example.com", "msg_1").await;

        let (body, headers) = lemlist_webhook("evt_1", "emailsOpened", "msg_1");

        let first = h
            .pipeline
            .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
            .await
            .unwrap();
        assert!(matches!(first, IngestReceipt::Applied { .. }));

        let second = h
            .pipeline
            .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
            .await
            .unwrap();
        assert_eq!(second, IngestReceipt::Duplicate);

        assert_eq!(event_row_count(&h).await, 1);
        let counters = h.store.get_counters(&h.instance_id).await.unwrap();
        assert_eq!(counters.total_opened, 1);

        let events = h.store.list_events(&enrollment_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Opened);
        assert_eq!(events[0].provider_event_id.as_deref(), Some("evt_1"));
    }

    #[tokio::test]
    async fn test_byte_identical_payload_required() {
        let h = setup([20, 20, 20, 20]).await;
        enroll_dispatched(&h, "ada@example.com", "msg_1").await;

        let (body, headers) = lemlist_webhook("evt_1", "emailsOpened", "msg_1");

        // Re-serializing the parsed JSON with different spacing breaks the MAC
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let reserialized = serde_json::to_string_pretty(&parsed).unwrap();

        let err = h
            .pipeline
            .ingest_webhook(ProviderKind::Lemlist, reserialized.as_bytes(), &headers)
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 401);

        // The original bytes still verify
        assert!(h
            .pipeline
            .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
            .await
            .is_ok());
    }
}

mod counters {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_distinct_events_no_lost_updates() {
        let h = setup([20, 20, 20, 20]).await;
        enroll_dispatched(&h, "ada@example.com", "msg_1").await;

        let mut handles = Vec::new();
        for i in 0..100 {
            let pipeline = h.pipeline.clone();
            handles.push(tokio::spawn(async move {
                let (body, headers) =
                    lemlist_webhook(&format!("evt_{}", i), "emailsDelivered", "msg_1");
                pipeline
                    .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
                    .await
            }));
        }
        for handle in handles {
            assert!(matches!(
                handle.await.unwrap().unwrap(),
                IngestReceipt::Applied { .. }
            ));
        }

        assert_eq!(event_row_count(&h).await, 100);
        let counters = h.store.get_counters(&h.instance_id).await.unwrap();
        assert_eq!(counters.total_delivered, 100);
    }

    #[tokio::test]
    async fn test_open_rate_uses_delivered_denominator() {
        let h = setup([20, 20, 20, 20]).await;
        enroll_dispatched(&h, "ada@example.com", "msg_1").await;

        // 4 sent, 2 delivered, 1 opened
        for i in 0..4 {
            let (body, headers) = lemlist_webhook(&format!("s{}", i), "emailsSent", "msg_1");
            h.pipeline
                .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
                .await
                .unwrap();
        }
        for i in 0..2 {
            let (body, headers) = lemlist_webhook(&format!("d{}", i), "emailsDelivered", "msg_1");
            h.pipeline
                .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
                .await
                .unwrap();
        }
        let (body, headers) = lemlist_webhook("o1", "emailsOpened", "msg_1");
        h.pipeline
            .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
            .await
            .unwrap();

        let counters = h.store.get_counters(&h.instance_id).await.unwrap();
        assert_eq!(counters.total_sent, 4);
        assert_eq!(counters.total_delivered, 2);
        // 1/2, not 1/4
        assert!((counters.open_rate() - 0.5).abs() < f64::EPSILON);
        assert!((counters.delivery_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_postmark_events_without_provider_id_dedup_on_natural_key() {
        let h = setup([20, 20, 20, 20]).await;
        enroll_dispatched(&h, "ada@example.com", "pm_msg_1").await;

        let body = serde_json::to_vec(&serde_json::json!({
            "RecordType": "Delivery",
            "MessageID": "pm_msg_1",
            "DeliveredAt": "2025-06-01T11:00:00Z",
        }))
        .unwrap();
        let mut headers = HashMap::new();
        headers.insert(
            "x-postmark-signature".to_string(),
            security::compute_signature(SECRET, &body),
        );

        let first = h
            .pipeline
            .ingest_webhook(ProviderKind::Postmark, &body, &headers)
            .await
            .unwrap();
        assert!(matches!(first, IngestReceipt::Applied { .. }));

        // Redelivery of the identical payload lands on the same digest id
        let second = h
            .pipeline
            .ingest_webhook(ProviderKind::Postmark, &body, &headers)
            .await
            .unwrap();
        assert_eq!(second, IngestReceipt::Duplicate);

        let counters = h.store.get_counters(&h.instance_id).await.unwrap();
        assert_eq!(counters.total_delivered, 1);
    }
}

mod orphans {
    use super::*;

    #[tokio::test]
    async fn test_orphan_then_resolve() {
        let h = setup([20, 50, 50, 50]).await;

        // Webhook arrives before any enrollment carries msg_X
        let (body, headers) = lemlist_webhook("evt_orp", "emailsOpened", "msg_X");
        let receipt = h
            .pipeline
            .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
            .await
            .unwrap();
        assert_eq!(receipt, IngestReceipt::Queued);
        assert_eq!(event_row_count(&h).await, 0);

        let health = h.queue.health().await;
        assert_eq!(health.pending_count, 1);

        // The enrollment shows up before the retry fires
        enroll_dispatched(&h, "ada@example.com", "msg_X").await;

        // Let the entry become due, then run a processor cycle
        tokio::time::sleep(Duration::from_millis(60)).await;
        let processed = h.queue.process_due(&h.pipeline).await.unwrap();
        assert_eq!(processed, 1);

        assert_eq!(event_row_count(&h).await, 1);
        let counters = h.store.get_counters(&h.instance_id).await.unwrap();
        assert_eq!(counters.total_opened, 1);

        let health = h.queue.health().await;
        assert_eq!(health.pending_count, 0);
        assert!(health.last_processed_at.is_some());
    }

    #[tokio::test]
    async fn test_background_processor_resolves_orphan() {
        let h = setup([20, 50, 50, 50]).await;

        let (body, headers) = lemlist_webhook("evt_bg", "emailsClicked", "msg_BG");
        h.pipeline
            .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
            .await
            .unwrap();

        enroll_dispatched(&h, "grace@example.com", "msg_BG").await;

        h.queue.clone().start(h.pipeline.clone()).await;
        // Poll interval 50ms, first backoff 20ms: two cycles are plenty
        tokio::time::sleep(Duration::from_millis(300)).await;
        h.queue.shutdown(&h.pipeline).await;

        assert_eq!(event_row_count(&h).await, 1);
        let counters = h.store.get_counters(&h.instance_id).await.unwrap();
        assert_eq!(counters.total_clicked, 1);
    }

    #[tokio::test]
    async fn test_orphan_exhaustion_dead_letters() {
        let h = setup([10, 10, 10, 10]).await;

        let (body, headers) = lemlist_webhook("evt_dlq", "emailsOpened", "msg_never");
        h.pipeline
            .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
            .await
            .unwrap();

        // Never create the enrollment; run 4 lookup attempts
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(15)).await;
            h.queue.process_due(&h.pipeline).await.unwrap();
        }

        // Queue is empty, one dead letter with status failed, no event row
        let health = h.queue.health().await;
        assert_eq!(health.pending_count, 0);
        assert_eq!(event_row_count(&h).await, 0);

        let letters = h.dlq.list(&DlqFilter::default()).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].status, DeadLetterStatus::Failed);
        assert_eq!(letters[0].provider, "lemlist");
        assert!(letters[0].failure_reason.contains("msg_never"));
    }

    #[tokio::test]
    async fn test_drain_leaves_undue_entries() {
        let h = setup([5_000, 5_000, 5_000, 5_000]).await;

        let (body, headers) = lemlist_webhook("evt_far", "emailsOpened", "msg_far");
        h.pipeline
            .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
            .await
            .unwrap();

        h.queue.clone().start(h.pipeline.clone()).await;
        h.queue.shutdown(&h.pipeline).await;

        // The entry was not yet due, so the drain must leave it queued
        let health = h.queue.health().await;
        assert_eq!(health.pending_count, 1);
    }
}

mod dead_letters {
    use super::*;

    #[tokio::test]
    async fn test_replay_after_enrollment_appears() {
        let h = setup([10, 10, 10, 10]).await;

        let (body, headers) = lemlist_webhook("evt_rp", "emailsReplied", "msg_RP");
        h.pipeline
            .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
            .await
            .unwrap();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(15)).await;
            h.queue.process_due(&h.pipeline).await.unwrap();
        }
        let letters = h.dlq.list(&DlqFilter::default()).await.unwrap();
        assert_eq!(letters.len(), 1);

        // Operator fixes the world, then replays
        let enrollment_id = enroll_dispatched(&h, "ada@example.com", "msg_RP").await;
        let reports = h
            .dlq
            .replay(&[letters[0].id.clone()], &h.pipeline)
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].replayed, "replay should succeed: {}", reports[0].detail);

        let replayed = h
            .dlq
            .list(&DlqFilter {
                status: Some(DeadLetterStatus::Replayed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(replayed.len(), 1);
        assert!(replayed[0].replayed_at.is_some());

        // The reply landed: counter bumped, enrollment completed
        let counters = h.store.get_counters(&h.instance_id).await.unwrap();
        assert_eq!(counters.total_replied, 1);
        let enrollment = h.store.get_enrollment(&enrollment_id).await.unwrap();
        assert_eq!(
            enrollment.status,
            cadence_core::models::EnrollmentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_list_filters() {
        let h = setup([10, 10, 10, 10]).await;

        let (body, headers) = lemlist_webhook("evt_f1", "emailsOpened", "msg_f1");
        h.pipeline
            .ingest_webhook(ProviderKind::Lemlist, &body, &headers)
            .await
            .unwrap();
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(15)).await;
            h.queue.process_due(&h.pipeline).await.unwrap();
        }

        let by_provider = h
            .dlq
            .list(&DlqFilter {
                provider: Some("lemlist".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_provider.len(), 1);

        let none = h
            .dlq
            .list(&DlqFilter {
                provider: Some("postmark".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
