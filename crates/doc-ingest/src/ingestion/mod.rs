//! Document ingestion: format extraction, normalization, chunking and the JSONL sink

pub mod chunker;
pub mod extractor;
pub mod html;
pub mod normalizer;
pub mod pdf;
pub mod pipeline;
pub mod sink;
pub mod tabular;

pub use chunker::{serialize_record, RecordChunker, TextChunker};
pub use extractor::FormatExtractor;
pub use normalizer::clean_text;
pub use pdf::{LopdfEngine, PdfEngine, PdfExtractEngine, PdfExtractor};
pub use pipeline::IngestPipeline;
pub use sink::ChunkSink;
