//! Background worker pool draining the ingestion queue

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use super::job_queue::{IngestOutcome, IngestStage, IngestTask};
use super::orchestrator::IngestOrchestrator;

/// Drains the queue, running up to `concurrency` files at once
pub struct IngestWorker {
    orchestrator: Arc<IngestOrchestrator>,
    concurrency: usize,
}

impl IngestWorker {
    pub fn new(orchestrator: Arc<IngestOrchestrator>, concurrency: usize) -> Self {
        Self {
            orchestrator,
            concurrency: concurrency.max(1),
        }
    }

    /// Run until every queue sender is dropped and in-flight files finish
    pub async fn run(self, mut receiver: mpsc::Receiver<IngestTask>) {
        tracing::info!("Ingestion worker started: {} concurrent files", self.concurrency);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight = Vec::new();

        while let Some(task) = receiver.recv().await {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let orchestrator = self.orchestrator.clone();

            in_flight.retain(|handle: &tokio::task::JoinHandle<()>| !handle.is_finished());
            in_flight.push(tokio::spawn(async move {
                let _permit = permit;
                Self::run_contained(orchestrator, task).await;
            }));
        }

        futures::future::join_all(in_flight).await;
        tracing::info!("Ingestion worker stopped");
    }

    /// Run one file on its own task so a panic cannot take the pool down
    async fn run_contained(orchestrator: Arc<IngestOrchestrator>, task: IngestTask) {
        let task_id = task.id;
        let registry = orchestrator.registry().clone();

        let handle = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.run(task).await }
        });

        if let Err(e) = handle.await {
            let stage = registry.current_stage(task_id).unwrap_or(IngestStage::Dispatched);
            tracing::error!(task_id = %task_id, stage = %stage, "Ingestion task aborted: {}", e);
            registry.finish(
                task_id,
                IngestOutcome::Failed {
                    stage,
                    message: format!("ingestion task aborted: {}", e),
                },
            );
        }
    }
}
