//! Per-file ingestion stages, synchronous and side-effect free apart from the sink

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use super::chunker::TextChunker;
use super::extractor::FormatExtractor;
use super::normalizer::clean_text;
use super::sink::ChunkSink;
use crate::config::IngestConfig;
use crate::error::Result;
use crate::types::document::stem_of;
use crate::types::{ExtractedContent, SourceFormat};

/// Extract, normalize, chunk and sink one document
///
/// Each stage is a separate call so the caller can track and bound them
/// individually.
pub struct IngestPipeline {
    extractor: FormatExtractor,
    chunker: TextChunker,
    sink: ChunkSink,
}

impl IngestPipeline {
    /// Build the pipeline from configuration
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Ok(Self::new(
            FormatExtractor::default(),
            TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?,
            ChunkSink::new(config.storage.processed_dir()),
        ))
    }

    pub fn new(extractor: FormatExtractor, chunker: TextChunker, sink: ChunkSink) -> Self {
        Self {
            extractor,
            chunker,
            sink,
        }
    }

    pub fn chunker(&self) -> &TextChunker {
        &self.chunker
    }

    pub fn extract(&self, format: SourceFormat, path: &Path) -> Result<ExtractedContent> {
        self.extractor.extract(format, path)
    }

    /// Clean text content; record sets are normalized per record while chunking
    pub fn normalize(content: ExtractedContent) -> ExtractedContent {
        match content {
            ExtractedContent::Text(text) => ExtractedContent::Text(clean_text(&text)),
            records => records,
        }
    }

    /// Window chunking for text, streaming chunking for record sets
    pub fn chunk(&self, content: &ExtractedContent) -> Vec<String> {
        match content {
            ExtractedContent::Text(text) => self.chunker.chunk_text(text),
            ExtractedContent::RecordSet(records) => self.chunker.chunk_records(records),
        }
    }

    /// Write the artifact for `raw_path`; returns its path
    pub fn sink(&self, chunks: &[String], raw_path: &Path, format: SourceFormat) -> Result<PathBuf> {
        let stem = stem_of(raw_path);
        let destination = self.sink.artifact_path(format.as_str(), &stem);

        let mut base = Map::new();
        base.insert("id".to_string(), Value::String(stem));
        base.insert(
            "source_file".to_string(),
            Value::String(raw_path.to_string_lossy().into_owned()),
        );
        base.insert("format".to_string(), Value::String(format.as_str().to_string()));

        self.sink.save(chunks, &destination, &base)?;
        Ok(destination)
    }
}
