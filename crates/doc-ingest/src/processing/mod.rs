//! Background ingestion: task queue, per-file orchestration and the worker pool

mod job_queue;
mod orchestrator;
mod worker;

pub use job_queue::{
    IngestOutcome, IngestQueue, IngestStage, IngestTask, QueueStats, TaskEvent, TaskRecord,
    TaskRegistry, TaskState, DEFAULT_FINISHED_RETENTION,
};
pub use orchestrator::{IngestOrchestrator, RawDocument};
pub use worker::IngestWorker;
