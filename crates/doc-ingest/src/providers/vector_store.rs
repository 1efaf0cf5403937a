//! Vector store provider trait for embedded chunks

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Chunk;

/// A chunk with its embedding, ready to insert
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Nearest-neighbor hit
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Distance to the query; lower is closer
    pub distance: f32,
}

/// Trait for vector storage and nearest-neighbor search
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Insert rows; returns how many were stored
    async fn insert(&self, rows: Vec<EmbeddedChunk>) -> Result<usize>;

    /// Closest `top_k` chunks to `query`, nearest first
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;

    /// Get total number of vectors stored
    async fn len(&self) -> Result<usize>;

    /// Check if store is empty
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Get provider name for logging
    fn name(&self) -> &str;
}
