//! Ingestion task queue with an in-memory registry and a result channel

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Finished outcomes kept for subscribers that fall behind
const EVENT_BUFFER: usize = 256;

/// Finished records kept before the oldest are dropped
pub const DEFAULT_FINISHED_RETENTION: usize = 10_000;

/// Per-file pipeline stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Dispatched,
    Extracting,
    Normalizing,
    Chunking,
    Sinking,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dispatched => "dispatched",
            Self::Extracting => "extracting",
            Self::Normalizing => "normalizing",
            Self::Chunking => "chunking",
            Self::Sinking => "sinking",
        })
    }
}

/// Terminal result of one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Artifact written under `processed/{format}/{output_stem}.jsonl`
    Completed { output_stem: String, chunks: usize },
    /// Nothing to ingest; no artifact
    Empty,
    /// A stage failed
    Failed { stage: IngestStage, message: String },
}

impl IngestOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Registry state of a task
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running { stage: IngestStage },
    Finished { outcome: IngestOutcome },
}

/// One file waiting for, or undergoing, ingestion
#[derive(Debug, Clone)]
pub struct IngestTask {
    pub id: Uuid,
    /// RawDocument path; the run that takes this task owns the file
    pub path: PathBuf,
}

impl IngestTask {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
        }
    }

    pub fn filename(&self) -> String {
        file_name_of(&self.path)
    }
}

/// Registry entry for a task
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub filename: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub state: TaskState,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Published when a task reaches a terminal state
#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub task_id: Uuid,
    pub filename: String,
    pub outcome: IngestOutcome,
}

/// Queue statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_tasks: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub empty: usize,
    pub failed: usize,
    pub worker_count: usize,
}

/// Shared view of queued and running tasks plus the most recent finished ones
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<Uuid, TaskRecord>>,
    events: broadcast::Sender<TaskEvent>,
    max_finished: usize,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_FINISHED_RETENTION)
    }

    /// Keep at most `max_finished` finished records; queued and running ones are never dropped
    pub fn with_retention(max_finished: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            tasks: Arc::new(DashMap::new()),
            events,
            max_finished: max_finished.max(1),
        }
    }

    /// Add a task in the `Queued` state
    pub fn register(&self, task: &IngestTask) {
        self.tasks.insert(
            task.id,
            TaskRecord {
                task_id: task.id,
                filename: task.filename(),
                path: task.path.clone(),
                state: TaskState::Queued,
                submitted_at: Utc::now(),
                started_at: None,
                finished_at: None,
            },
        );
    }

    /// Move a task into `stage`
    pub fn set_stage(&self, task_id: Uuid, stage: IngestStage) {
        if let Some(mut record) = self.tasks.get_mut(&task_id) {
            record.started_at.get_or_insert_with(Utc::now);
            record.state = TaskState::Running { stage };
        }
    }

    /// Stage a running task is in
    pub fn current_stage(&self, task_id: Uuid) -> Option<IngestStage> {
        self.tasks.get(&task_id).and_then(|record| match record.state {
            TaskState::Running { stage } => Some(stage),
            _ => None,
        })
    }

    /// Record a terminal outcome and publish it
    pub fn finish(&self, task_id: Uuid, outcome: IngestOutcome) {
        let filename = match self.tasks.get_mut(&task_id) {
            Some(mut record) => {
                record.state = TaskState::Finished {
                    outcome: outcome.clone(),
                };
                record.finished_at = Some(Utc::now());
                record.filename.clone()
            }
            None => return,
        };
        self.evict_finished();

        // No subscribers is fine
        let _ = self.events.send(TaskEvent {
            task_id,
            filename,
            outcome,
        });
    }

    /// Drop the oldest finished records beyond the retention limit
    fn evict_finished(&self) {
        let mut finished: Vec<(DateTime<Utc>, Uuid)> = self
            .tasks
            .iter()
            .filter_map(|record| match record.state {
                TaskState::Finished { .. } => Some((
                    record.finished_at.unwrap_or(record.submitted_at),
                    record.task_id,
                )),
                _ => None,
            })
            .collect();
        if finished.len() <= self.max_finished {
            return;
        }

        finished.sort();
        let excess = finished.len() - self.max_finished;
        for (_, task_id) in finished.into_iter().take(excess) {
            self.tasks.remove(&task_id);
        }
        tracing::debug!("Dropped {} finished task records", excess);
    }

    pub fn get(&self, task_id: Uuid) -> Option<TaskRecord> {
        self.tasks.get(&task_id).map(|r| r.clone())
    }

    /// All tasks, oldest first
    pub fn list(&self) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self.tasks.iter().map(|r| r.clone()).collect();
        records.sort_by_key(|r| r.submitted_at);
        records
    }

    /// Receive every outcome recorded after this call
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self, worker_count: usize) -> QueueStats {
        let mut stats = QueueStats {
            total_tasks: self.tasks.len(),
            worker_count,
            ..Default::default()
        };
        for record in self.tasks.iter() {
            match &record.state {
                TaskState::Queued => stats.queued += 1,
                TaskState::Running { .. } => stats.running += 1,
                TaskState::Finished { outcome } => match outcome {
                    IngestOutcome::Completed { .. } => stats.completed += 1,
                    IngestOutcome::Empty => stats.empty += 1,
                    IngestOutcome::Failed { .. } => stats.failed += 1,
                },
            }
        }
        stats
    }
}

/// Bounded queue feeding the ingestion workers
pub struct IngestQueue {
    registry: TaskRegistry,
    sender: mpsc::Sender<IngestTask>,
    worker_count: usize,
}

impl IngestQueue {
    /// Create a queue; the receiver goes to [`super::IngestWorker::run`]
    pub fn new(capacity: usize, worker_count: usize) -> (Self, mpsc::Receiver<IngestTask>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        let queue = Self {
            registry: TaskRegistry::new(),
            sender,
            worker_count,
        };

        (queue, receiver)
    }

    /// Queue a RawDocument for ingestion; waits while the queue is full
    pub async fn submit(&self, path: impl Into<PathBuf>) -> Result<Uuid> {
        let task = IngestTask::new(path);
        let task_id = task.id;
        self.registry.register(&task);

        if let Err(e) = self.sender.send(task).await {
            tracing::error!(task_id = %task_id, "Failed to queue ingestion: {}", e);
            self.registry.finish(
                task_id,
                IngestOutcome::Failed {
                    stage: IngestStage::Dispatched,
                    message: "ingestion workers are not running".to_string(),
                },
            );
            return Err(Error::internal("ingestion workers are not running"));
        }

        tracing::debug!(task_id = %task_id, "Queued ingestion");
        Ok(task_id)
    }

    /// Replace the registry with one keeping at most `max_finished` finished records
    pub fn with_retention(mut self, max_finished: usize) -> Self {
        self.registry = TaskRegistry::with_retention(max_finished);
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn get(&self, task_id: Uuid) -> Option<TaskRecord> {
        self.registry.get(task_id)
    }

    pub fn list(&self) -> Vec<TaskRecord> {
        self.registry.list()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.registry.subscribe()
    }

    pub fn stats(&self) -> QueueStats {
        self.registry.stats(self.worker_count)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
