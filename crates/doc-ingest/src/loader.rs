//! Reads processed artifacts and loads them into a vector store

use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::providers::{EmbeddedChunk, EmbeddingProvider, VectorStoreProvider};
use crate::types::Chunk;

/// Default number of texts per embedding call
const DEFAULT_BATCH_SIZE: usize = 64;

/// Parse every chunk line of an artifact
///
/// Blank lines and lines without a `text` field are skipped. A line that is
/// not valid JSON, or lacks the chunk fields, is an error.
pub fn read_artifact(path: &Path) -> Result<Vec<Chunk>> {
    let content = std::fs::read_to_string(path)?;
    parse_artifact(&content, path)
}

fn parse_artifact(content: &str, path: &Path) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();

    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let bad_line = |e: serde_json::Error| {
            Error::invalid(format!("{} line {}: {}", path.display(), number + 1, e))
        };

        let value: serde_json::Value = serde_json::from_str(line).map_err(bad_line)?;
        if !value.get("text").is_some_and(|t| t.is_string()) {
            continue;
        }
        chunks.push(serde_json::from_value(value).map_err(bad_line)?);
    }

    Ok(chunks)
}

/// All `*.jsonl` artifacts under `processed_dir`, sorted by path
pub fn discover_artifacts(processed_dir: &Path) -> Result<Vec<PathBuf>> {
    if !processed_dir.exists() {
        return Ok(Vec::new());
    }

    let mut artifacts = Vec::new();
    for entry in WalkDir::new(processed_dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "jsonl") {
            artifacts.push(path.to_path_buf());
        }
    }
    Ok(artifacts)
}

/// Rows loaded per artifact
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub files: Vec<(PathBuf, usize)>,
}

impl LoadReport {
    pub fn total_rows(&self) -> usize {
        self.files.iter().map(|(_, rows)| rows).sum()
    }
}

/// Embeds artifact chunks and inserts them into a vector store
pub struct ArtifactLoader {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreProvider>,
    batch_size: usize,
}

impl ArtifactLoader {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStoreProvider>) -> Self {
        Self {
            embedder,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Load one artifact; returns the number of rows inserted
    pub async fn load_file(&self, path: &Path) -> Result<usize> {
        let content = tokio::fs::read_to_string(path).await?;
        let chunks = parse_artifact(&content, path)?;

        if chunks.is_empty() {
            tracing::warn!(path = %path.display(), "Artifact has no chunks, skipping");
            return Ok(0);
        }

        let mut inserted = 0;
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(Error::internal(format!(
                    "{} returned {} embeddings for {} texts",
                    self.embedder.name(),
                    vectors.len(),
                    batch.len()
                )));
            }
            if let Some(bad) = vectors.iter().find(|v| v.len() != self.embedder.dimensions()) {
                return Err(Error::internal(format!(
                    "{} returned a {}-dimensional vector, expected {}",
                    self.embedder.name(),
                    bad.len(),
                    self.embedder.dimensions()
                )));
            }

            let rows = batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
                .collect();
            inserted += self.store.insert(rows).await?;
        }

        tracing::info!(
            path = %path.display(),
            rows = inserted,
            store = self.store.name(),
            "Loaded artifact"
        );
        Ok(inserted)
    }

    /// Load every artifact under `processed_dir`
    pub async fn load_all(&self, processed_dir: &Path) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        for path in discover_artifacts(processed_dir)? {
            let rows = self.load_file(&path).await?;
            report.files.push((path, rows));
        }

        tracing::info!(
            files = report.files.len(),
            rows = report.total_rows(),
            "Artifact load finished"
        );
        Ok(report)
    }
}
