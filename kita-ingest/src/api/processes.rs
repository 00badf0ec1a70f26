//! Process polling endpoints
//!
//! GET /api/v1/processes/:id, GET /api/v1/processes/:id/documentation-entries

use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::models::{DocumentationEntry, Process, ProcessId};
use crate::AppState;

/// GET /api/v1/processes/:id response
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    #[serde(flatten)]
    pub process: Process,
    /// Failed after writing some of the expected entries
    pub partial: bool,
}

impl From<Process> for ProcessResponse {
    fn from(process: Process) -> Self {
        Self {
            partial: process.is_partial_failure(),
            process,
        }
    }
}

/// GET /api/v1/processes/:id/documentation-entries response
#[derive(Debug, Serialize)]
pub struct ProcessEntriesResponse {
    pub process_id: ProcessId,
    pub entries: Vec<DocumentationEntry>,
}

fn process_id(path: Result<Path<ProcessId>, PathRejection>) -> ApiResult<ProcessId> {
    path.map(|Path(id)| id)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// GET /api/v1/processes/:id
pub async fn get_process(
    State(state): State<AppState>,
    path: Result<Path<ProcessId>, PathRejection>,
) -> ApiResult<Json<ProcessResponse>> {
    let id = process_id(path)?;
    let process = state.tracker.get_by_id(id).await?;
    Ok(Json(process.into()))
}

/// GET /api/v1/processes/:id/documentation-entries
pub async fn get_process_entries(
    State(state): State<AppState>,
    path: Result<Path<ProcessId>, PathRejection>,
) -> ApiResult<Json<ProcessEntriesResponse>> {
    let id = process_id(path)?;
    // 404 for unknown processes rather than an empty list
    state.tracker.get_by_id(id).await?;
    let entries = state.documentation.list_by_process(id).await?;

    Ok(Json(ProcessEntriesResponse {
        process_id: id,
        entries,
    }))
}

pub fn process_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/processes/:id", get(get_process))
        .route(
            "/api/v1/processes/:id/documentation-entries",
            get(get_process_entries),
        )
}
