//! API routes for the ingestion server

pub mod ingest;
pub mod tasks;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_request_bytes: usize) -> Router<AppState> {
    Router::new()
        // Chunked upload
        .route(
            "/files/upload_chunk",
            post(upload::upload_chunk).layer(DefaultBodyLimit::max(max_request_bytes)),
        )
        .route("/files/merge_file", post(upload::merge_file))
        .route("/files/sessions/:session_id", get(upload::get_session))
        // Whole-file upload, ingested within the request. Size is enforced per
        // file while streaming, so the batch as a whole has no body limit.
        .route(
            "/load_documents",
            post(ingest::load_documents).layer(DefaultBodyLimit::disable()),
        )
        // Background tasks
        .route("/ingest/tasks", get(tasks::list_tasks))
        .route("/ingest/tasks/:id", get(tasks::get_task))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "doc-ingest",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Document ingestion: chunked uploads, HTML/PDF/CSV/Parquet extraction, JSONL chunk artifacts",
        "endpoints": {
            "POST /api/files/upload_chunk": "Store one part (multipart: file_id, chunk_index, chunk)",
            "POST /api/files/merge_file": "Merge parts (file_id, total_chunks, filename) and queue ingestion",
            "GET /api/files/sessions/:session_id": "Part indices received for a session",
            "POST /api/load_documents": "Upload whole files and ingest them within the request",
            "GET /api/ingest/tasks": "List background ingestion tasks and queue stats",
            "GET /api/ingest/tasks/:id": "Get one ingestion task"
        },
        "guarantees": {
            "merge_file": "Merge errors are returned; ingestion outcome is only visible via tasks and logs",
            "load_documents": "Per-file result in the response body",
            "cleanup": "Raw documents are deleted after every ingestion run, whatever the outcome",
            "artifacts": "processed/{format}/{stem}.jsonl appears only when fully written"
        }
    }))
}
