//! Error types for the ingestion pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed identifier, filename or form field
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// File suffix has no extractor
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Every extraction engine failed for a file
    #[error("Failed to extract '{filename}': {message}")]
    Extraction { filename: String, message: String },

    /// Merge hit a part that is not in staging
    #[error("Session '{session_id}' is missing part {part_index}")]
    StagingIncomplete {
        session_id: String,
        part_index: u32,
        #[source]
        source: std::io::Error,
    },

    /// Artifact could not be written
    #[error("Failed to write artifact '{}': {source}", path.display())]
    SinkWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Destination already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Whole-file upload over the configured threshold
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Unknown task or session
    #[error("Not found: {0}")]
    NotFound(String),

    /// A bounded operation ran out of time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an extraction error
    pub fn extraction(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::UnsupportedFormat(_) => (StatusCode::BAD_REQUEST, "unsupported_format"),
            Error::Extraction { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "extraction_failure"),
            Error::StagingIncomplete { .. } => (StatusCode::CONFLICT, "staging_incomplete"),
            Error::SinkWrite { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "sink_write_failure"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Error::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Csv(_) => (StatusCode::UNPROCESSABLE_ENTITY, "csv_error"),
            Error::Parquet(_) => (StatusCode::UNPROCESSABLE_ENTITY, "parquet_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
