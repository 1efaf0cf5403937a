//! Provider abstractions for the downstream embedding model and vector store

pub mod embedding;
pub mod vector_store;

pub use embedding::EmbeddingProvider;
pub use vector_store::{EmbeddedChunk, ScoredChunk, VectorStoreProvider};
