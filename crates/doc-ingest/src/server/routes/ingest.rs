//! Synchronous whole-file ingestion endpoint

use axum::{
    extract::{multipart::Field, Multipart, State},
    Json,
};
use futures::StreamExt;
use std::path::Path;
use std::time::Instant;
use tokio::io::AsyncWriteExt;

use super::upload::multipart_error;
use crate::error::{Error, Result};
use crate::processing::IngestTask;
use crate::server::state::AppState;
use crate::types::response::{FileResult, LoadDocumentsResponse};
use crate::upload::{create_new, raw_destination};

/// Result name for whatever followed a broken multipart body
const UNREAD_REMAINDER: &str = "<unread remainder of request>";

/// POST /api/load_documents - Place and ingest each uploaded file in the request
///
/// Every file gets its own result; one failing file does not stop the rest.
/// Files over the whole-file limit are rejected and must use the chunked path.
pub async fn load_documents(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<LoadDocumentsResponse>> {
    let start = Instant::now();
    let max_bytes = state.config().server.max_whole_file_bytes;
    let raw_dir = state.config().storage.raw_dir();
    let mut results = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            // Files already ingested keep their results
            Err(e) if !results.is_empty() => {
                let error = multipart_error(e);
                tracing::warn!("Request body ended early: {}", error);
                results.push(FileResult::Rejected {
                    filename: UNREAD_REMAINDER.to_string(),
                    error: error.to_string(),
                });
                break;
            }
            Err(e) => return Err(multipart_error(e)),
        };
        let Some(declared) = field.file_name().map(str::to_string) else {
            tracing::debug!("Ignoring non-file field '{}'", field.name().unwrap_or(""));
            continue;
        };

        let destination = match raw_destination(&raw_dir, &declared) {
            Ok(destination) => destination,
            Err(e) => {
                results.push(FileResult::Rejected {
                    filename: declared,
                    error: e.to_string(),
                });
                continue;
            }
        };
        let filename = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(declared);

        if let Err(e) = place_upload(&destination, field, max_bytes).await {
            tracing::warn!(file = %filename, "Rejected upload: {}", e);
            results.push(FileResult::Rejected {
                filename,
                error: e.to_string(),
            });
            continue;
        }

        let task = IngestTask::new(destination);
        state.orchestrator().registry().register(&task);
        let outcome = state.orchestrator().run(task).await;
        results.push(FileResult::from_outcome(filename, outcome));
    }

    let success = results.iter().all(|r| {
        matches!(r, FileResult::Completed { .. } | FileResult::Empty { .. })
    });

    Ok(Json(LoadDocumentsResponse {
        success,
        results,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

/// Stream a file field to a new raw document, enforcing the size limit
///
/// On any failure the partially written file is removed.
async fn place_upload(destination: &Path, mut field: Field<'_>, max_bytes: u64) -> Result<u64> {
    let mut file = create_new(destination).await?;

    let written = async {
        let mut written = 0u64;
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(multipart_error)?;
            written += chunk.len() as u64;
            if written > max_bytes {
                return Err(Error::PayloadTooLarge(format!(
                    "file exceeds {} bytes; upload it in parts via /api/files/upload_chunk",
                    max_bytes
                )));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(written)
    }
    .await;

    if written.is_err() {
        drop(file);
        let _ = tokio::fs::remove_file(destination).await;
    }
    written
}
