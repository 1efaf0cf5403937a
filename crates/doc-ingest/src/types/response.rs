//! Response types for the HTTP API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::processing::{IngestOutcome, QueueStats, TaskRecord};

/// Response for an accepted part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPartResponse {
    pub status: String,
    pub chunk_index: u32,
}

/// Response for a merge that was queued for ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResponse {
    pub status: String,
    /// Final filename
    pub file: String,
    /// Task id to poll at `/api/ingest/tasks/{id}`
    pub task_id: Uuid,
    pub message: String,
}

/// Parts currently staged for a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub received_parts: Vec<u32>,
}

/// Per-file result of the synchronous whole-file endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileResult {
    /// Artifact written
    Completed {
        filename: String,
        output_stem: String,
        chunks: usize,
    },
    /// Nothing extractable; no artifact
    Empty { filename: String },
    /// A pipeline stage failed
    Failed {
        filename: String,
        stage: String,
        error: String,
    },
    /// Not accepted for processing (too large, bad name, conflict)
    Rejected { filename: String, error: String },
}

impl FileResult {
    /// Build a result from a finished outcome
    pub fn from_outcome(filename: String, outcome: IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::Completed { output_stem, chunks } => Self::Completed {
                filename,
                output_stem,
                chunks,
            },
            IngestOutcome::Empty => Self::Empty { filename },
            IngestOutcome::Failed { stage, message } => Self::Failed {
                filename,
                stage: stage.to_string(),
                error: message,
            },
        }
    }
}

/// Response for the whole-file endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadDocumentsResponse {
    /// True when every file completed or was empty
    pub success: bool,
    pub results: Vec<FileResult>,
    pub processing_time_ms: u64,
}

/// Response for listing tasks
#[derive(Debug, Clone, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskRecord>,
    pub stats: QueueStats,
}
