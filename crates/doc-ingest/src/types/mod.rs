//! Core types for the ingestion pipeline

pub mod document;
pub mod response;

pub use document::{Chunk, ExtractedContent, Record, SourceFormat};
