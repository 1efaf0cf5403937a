//! Source formats, extracted content and chunk records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// One flat row of tabular content, columns in declaration order
pub type Record = Map<String, Value>;

/// Supported source formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// HTML page
    Html,
    /// PDF document
    Pdf,
    /// Comma separated values
    Csv,
    /// Apache Parquet columnar file
    Parquet,
}

impl SourceFormat {
    /// Detect format from a lower-cased, dot-stripped extension
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.to_lowercase().as_str() {
            "html" | "htm" => Ok(Self::Html),
            "pdf" => Ok(Self::Pdf),
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            other => Err(Error::UnsupportedFormat(if other.is_empty() {
                "<no extension>".to_string()
            } else {
                other.to_string()
            })),
        }
    }

    /// Detect format from a filename or path
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_extension(&suffix_of(path))
    }

    /// Tag used in artifact records and the `processed/{format}` directory
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }

    /// Whether extraction yields a record set rather than text
    pub fn is_tabular(&self) -> bool {
        matches!(self, Self::Csv | Self::Parquet)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-cased extension without the dot, empty if there is none
pub fn suffix_of(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Filename stem used as the source id
pub fn stem_of(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string()
}

/// Output of a format extractor
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedContent {
    /// Plain text (HTML, PDF)
    Text(String),
    /// Ordered rows (CSV, Parquet)
    RecordSet(Vec<Record>),
}

impl ExtractedContent {
    /// True when there is nothing to ingest
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::RecordSet(records) => records.is_empty(),
        }
    }
}

/// One line of a processed artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Stem of the original filename
    #[serde(rename = "id")]
    pub source_id: String,
    /// Path of the raw document, for provenance
    #[serde(rename = "source_file")]
    pub source_path: String,
    /// Format tag
    pub format: String,
    /// Zero-based, contiguous per artifact
    pub chunk_index: usize,
    /// Chunk text
    pub text: String,
    /// Any further base metadata
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}
