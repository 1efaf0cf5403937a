//! Configuration for the ingestion service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// On-disk layout
    pub storage: StorageConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Background processing configuration
    pub processing: ProcessingConfig,
}

impl IngestConfig {
    /// Load configuration from a TOML file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.processing.workers == Some(0) {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.processing.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.processing.extract_timeout_secs == 0 || self.processing.file_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be at least one second".to_string()));
        }
        if self.processing.finished_task_retention == 0 {
            return Err(Error::Config("finished_task_retention must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Whole-file uploads larger than this must use the chunked path (default: 50MB)
    pub max_whole_file_bytes: u64,
    /// Body limit for a single upload request, parts included (default: 64MB)
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            max_whole_file_bytes: 50 * 1024 * 1024,
            max_request_bytes: 64 * 1024 * 1024,
        }
    }
}

/// On-disk layout rooted at `data_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root data directory
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// Merged and placed raw documents: `raw/{suffix}/{filename}`
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    /// Produced artifacts: `processed/{format}/{stem}.jsonl`
    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    /// Per-session part staging: `uploads/tmp/{session_id}/{index}.part`
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("uploads").join("tmp")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("doc-ingest");

        Self { data_dir }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Upper bound on characters per chunk
    pub chunk_size: usize,
    /// Characters repeated at the start of the next chunk
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 3000,
            chunk_overlap: 300,
        }
    }
}

/// Background processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of ingestion workers (default: CPU count, max 8)
    pub workers: Option<usize>,
    /// Pending tasks the queue holds before submitters wait
    pub queue_capacity: usize,
    /// Timeout for one extraction attempt chain in seconds
    pub extract_timeout_secs: u64,
    /// Timeout for a whole per-file run in seconds
    pub file_timeout_secs: u64,
    /// Finished task records kept for status queries
    pub finished_task_retention: usize,
}

impl ProcessingConfig {
    /// Resolved worker count
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| num_cpus::get().min(8)).max(1)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: None,
            queue_capacity: 1000,
            extract_timeout_secs: 120,
            file_timeout_secs: 300,
            finished_task_retention: crate::processing::DEFAULT_FINISHED_RETENTION,
        }
    }
}
