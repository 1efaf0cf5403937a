//! Background ingestion task endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::processing::TaskRecord;
use crate::server::state::AppState;
use crate::types::response::TaskListResponse;

/// GET /api/ingest/tasks - List all tasks with queue stats
pub async fn list_tasks(State(state): State<AppState>) -> Json<TaskListResponse> {
    Json(TaskListResponse {
        tasks: state.queue().list(),
        stats: state.queue().stats(),
    })
}

/// GET /api/ingest/tasks/:id - Get one task
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskRecord>> {
    state
        .queue()
        .get(task_id)
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))
}
