//! Application state for the ingestion server

use std::sync::Arc;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::ingestion::IngestPipeline;
use crate::processing::{IngestOrchestrator, IngestQueue, IngestWorker};
use crate::upload::{ChunkStore, Merger};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: IngestConfig,
    /// Part staging for chunked uploads
    chunk_store: ChunkStore,
    /// Reassembles staged parts into raw documents
    merger: Merger,
    /// Background ingestion queue
    queue: Arc<IngestQueue>,
    /// Runs single files; shared with the workers and the synchronous endpoint
    orchestrator: Arc<IngestOrchestrator>,
}

impl AppState {
    /// Create the state and start the ingestion workers
    ///
    /// Must be called inside a tokio runtime.
    pub async fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;
        let storage = &config.storage;

        for dir in [storage.raw_dir(), storage.processed_dir(), storage.staging_dir()] {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                Error::Config(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        tracing::info!("Data directory: {}", storage.data_dir.display());

        let chunk_store = ChunkStore::new(storage.staging_dir());
        let merger = Merger::new(chunk_store.clone(), storage.raw_dir());

        let pipeline = Arc::new(IngestPipeline::from_config(&config)?);
        let worker_count = config.processing.worker_count();
        let (queue, receiver) = IngestQueue::new(config.processing.queue_capacity, worker_count);
        let queue = Arc::new(queue.with_retention(config.processing.finished_task_retention));
        let orchestrator = Arc::new(IngestOrchestrator::new(
            pipeline,
            queue.registry().clone(),
            &config.processing,
        ));

        let worker = IngestWorker::new(orchestrator.clone(), worker_count);
        tokio::spawn(async move {
            worker.run(receiver).await;
        });
        tracing::info!(
            "Ingestion queue started: {} workers, capacity {}",
            worker_count,
            config.processing.queue_capacity
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                chunk_store,
                merger,
                queue,
                orchestrator,
            }),
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.inner.config
    }

    pub fn chunk_store(&self) -> &ChunkStore {
        &self.inner.chunk_store
    }

    pub fn merger(&self) -> &Merger {
        &self.inner.merger
    }

    pub fn queue(&self) -> &Arc<IngestQueue> {
        &self.inner.queue
    }

    pub fn orchestrator(&self) -> &Arc<IngestOrchestrator> {
        &self.inner.orchestrator
    }
}
