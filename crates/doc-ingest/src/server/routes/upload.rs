//! Chunked upload endpoints: part upload, merge, session inspection

use async_trait::async_trait;
use axum::{
    extract::{multipart::MultipartError, FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    Form, Json,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::response::{MergeResponse, SessionResponse, UploadPartResponse};
use crate::upload::validate_session_id;

/// POST /api/files/upload_chunk - Store one part of a chunked upload
///
/// Multipart fields: `file_id` (or `session_id`), `chunk_index`, `chunk`.
/// When the id fields come first the part is streamed straight to disk.
pub async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadPartResponse>> {
    let mut session_id: Option<String> = None;
    let mut part_index: Option<u32> = None;
    let mut buffered: Option<Bytes> = None;
    let mut stored = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file_id" | "session_id" => {
                let value = field.text().await.map_err(multipart_error)?;
                validate_session_id(value.trim())?;
                session_id = Some(value.trim().to_string());
            }
            "chunk_index" => {
                let value = field.text().await.map_err(multipart_error)?;
                part_index = Some(parse_index(&value, "chunk_index")?);
            }
            "chunk" => match (&session_id, part_index) {
                (Some(id), Some(index)) => {
                    let stream = field.map(|chunk| chunk.map_err(multipart_error));
                    state.chunk_store().put_part(id, index, Box::pin(stream)).await?;
                    stored = true;
                }
                _ => buffered = Some(field.bytes().await.map_err(multipart_error)?),
            },
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    let session_id = session_id.ok_or_else(|| Error::invalid("missing field 'file_id'"))?;
    let part_index = part_index.ok_or_else(|| Error::invalid("missing field 'chunk_index'"))?;

    if !stored {
        let data = buffered.ok_or_else(|| Error::invalid("missing field 'chunk'"))?;
        state
            .chunk_store()
            .put_part_bytes(&session_id, part_index, data)
            .await?;
    }

    Ok(Json(UploadPartResponse {
        status: "ok".to_string(),
        chunk_index: part_index,
    }))
}

/// Merge request fields, accepted as urlencoded or multipart form data
#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    #[serde(alias = "file_id")]
    pub session_id: String,
    #[serde(alias = "total_chunks")]
    pub total_parts: u32,
    pub filename: String,
}

#[async_trait]
impl<S> FromRequest<S> for MergeRequest
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(form) = Form::<MergeRequest>::from_request(req, state)
                .await
                .map_err(|e| Error::invalid(e.body_text()))?;
            return Ok(form);
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| Error::invalid(e.body_text()))?;

        let (mut session_id, mut total_parts, mut filename) = (None, None, None);
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or("").to_string();
            let value = field.text().await.map_err(multipart_error)?;
            match name.as_str() {
                "file_id" | "session_id" => session_id = Some(value.trim().to_string()),
                "total_chunks" | "total_parts" => {
                    total_parts = Some(parse_index(&value, "total_chunks")?)
                }
                "filename" => filename = Some(value),
                _ => {}
            }
        }

        Ok(Self {
            session_id: session_id.ok_or_else(|| Error::invalid("missing field 'file_id'"))?,
            total_parts: total_parts
                .ok_or_else(|| Error::invalid("missing field 'total_chunks'"))?,
            filename: filename.ok_or_else(|| Error::invalid("missing field 'filename'"))?,
        })
    }
}

/// POST /api/files/merge_file - Reassemble a session and queue its ingestion
///
/// The merge itself runs within the request and its failures are returned.
/// Ingestion is only queued; its outcome shows up in the task registry.
pub async fn merge_file(
    State(state): State<AppState>,
    request: MergeRequest,
) -> Result<(StatusCode, Json<MergeResponse>)> {
    let path = state
        .merger()
        .merge(&request.session_id, request.total_parts, &request.filename)
        .await?;

    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let task_id = state.queue().submit(path).await?;

    tracing::info!(
        session_id = %request.session_id,
        task_id = %task_id,
        file = %file,
        "Merged upload queued for ingestion"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(MergeResponse {
            status: "accepted".to_string(),
            file,
            task_id,
            message: "Merged; ingestion runs in the background".to_string(),
        }),
    ))
}

/// GET /api/files/sessions/:session_id - Parts received so far
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>> {
    let received_parts = state.chunk_store().received_parts(&session_id).await?;
    Ok(Json(SessionResponse {
        session_id,
        received_parts,
    }))
}

fn parse_index(value: &str, field: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::invalid(format!("'{}' must be a non-negative integer, got '{}'", field, value)))
}

/// Body-limit failures keep their 413; anything else is a bad request
pub(crate) fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(e.body_text())
    } else {
        Error::invalid(format!("Failed to read multipart body: {}", e.body_text()))
    }
}
