//! doc-ingest: document ingestion pipeline for retrieval systems
//!
//! Clients upload files whole or as resumable parts. Merged files are run in
//! the background through format extraction (HTML, PDF, CSV, Parquet), text
//! normalization and overlapping chunking. The chunks are published as JSONL
//! artifacts under `processed/{format}/{stem}.jsonl` for a downstream loader.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod loader;
pub mod processing;
pub mod providers;
pub mod server;
pub mod types;
pub mod upload;

pub use config::IngestConfig;
pub use error::{Error, Result};
pub use ingestion::{ChunkSink, FormatExtractor, IngestPipeline, TextChunker};
pub use processing::{IngestOrchestrator, IngestOutcome, IngestQueue, IngestStage};
pub use server::IngestServer;
pub use types::{Chunk, ExtractedContent, Record, SourceFormat};
pub use upload::{ChunkStore, Merger};
