// Copyright 2025 Cadence Labs
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use crate::campaigns::CampaignStore;
use crate::config::AppConfig;
use crate::db::DBClient;
use crate::events::{DeadLetterStore, EventPipeline, OrphanQueueConfig, OrphanedEventQueue, QueueHealth};
use crate::providers::ProviderFactory;
use crate::tools::ToolRegistry;
use crate::workflow::{WorkflowEngine, WorkflowStateStore};

/// Application state: every component wired once, storage handles injected
/// through constructors.
pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<DBClient>,
    pub campaigns: Arc<CampaignStore>,
    pub dlq: Arc<DeadLetterStore>,
    pub orphan_queue: Arc<OrphanedEventQueue>,
    pub pipeline: Arc<EventPipeline>,
    pub workflow_store: Arc<WorkflowStateStore>,
    pub workflow_engine: Arc<WorkflowEngine>,
    pub tools: Arc<ToolRegistry>,
    pub providers: Arc<ProviderFactory>,
}

impl AppState {
    /// Creates the application state.
    ///
    /// The orphan processor is NOT started here; call [`AppState::start`]
    /// once the process is ready to do background work.
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let db = Arc::new(DBClient::new(&config.db_path).await?);
        db.initialize_schema().await?;

        let campaigns = Arc::new(CampaignStore::new(db.clone()));
        let dlq = Arc::new(DeadLetterStore::new(db.clone()));
        let orphan_queue = Arc::new(OrphanedEventQueue::new(
            db.clone(),
            dlq.clone(),
            OrphanQueueConfig::default(),
        ));

        let pipeline = Arc::new(EventPipeline::new(
            db.clone(),
            campaigns.clone(),
            orphan_queue.clone(),
            config.providers.webhook_secrets.clone(),
            config.webhook_timeout,
        ));

        let workflow_store = Arc::new(WorkflowStateStore::new(db.clone()));
        let tools = Arc::new(ToolRegistry::new());
        let workflow_engine = Arc::new(WorkflowEngine::new(workflow_store.clone(), tools.clone()));

        let providers = Arc::new(ProviderFactory::new(config.providers.clone()));

        Ok(Self {
            config,
            db,
            campaigns,
            dlq,
            orphan_queue,
            pipeline,
            workflow_store,
            workflow_engine,
            tools,
            providers,
        })
    }

    /// Starts background processing (the orphan queue's poll loop).
    pub async fn start(&self) {
        self.orphan_queue
            .clone()
            .start(self.pipeline.clone())
            .await;
    }

    /// Graceful shutdown: stop polling, drain due orphan entries under the
    /// budget, then let the database handle drop. In-flight webhook
    /// transactions hold their own `Arc<DBClient>` clones and complete
    /// before the connection goes away.
    pub async fn shutdown(&self) {
        self.orphan_queue.shutdown(&self.pipeline).await;
        tracing::info!("Application state shut down");
    }

    /// Health surface for the external `/health` endpoint.
    pub async fn health(&self) -> QueueHealth {
        self.orphan_queue.health().await
    }
}
