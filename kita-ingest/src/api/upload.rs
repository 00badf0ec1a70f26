//! Audio upload endpoint
//!
//! POST /api/v1/audio/upload

use axum::{
    extract::{
        multipart::MultipartRejection, DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::models::{ProcessId, ProcessStatus};
use crate::services::AnalysisJob;
use crate::AppState;

/// Allowance for multipart boundaries, headers and the text fields
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// 202 body; `process_id` is null when the run is untracked
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub process_id: Option<ProcessId>,
}

/// POST /api/v1/audio/upload
///
/// Validates the upload, creates the Process and hands the audio to a
/// background pipeline. Returns before analysis starts.
pub async fn upload_audio(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let upload = state.validator.validate(multipart).await?;

    let tracking = state.tracker.create(ProcessStatus::Starting).await;
    if !tracking.is_tracked() && state.config.pipeline.require_tracking {
        warn!("Rejecting upload: progress tracking unavailable");
        return Err(ApiError::ServiceUnavailable(
            "Progress tracking is unavailable".to_string(),
        ));
    }

    info!(
        process_id = %tracking,
        bytes = upload.audio.len(),
        content_type = %upload.content_type,
        observed_at = %upload.observed_at,
        "Audio upload accepted"
    );

    // Detached: the pipeline outlives this request
    state.orchestrator.spawn(AnalysisJob::new(upload, tracking));

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            process_id: tracking.id(),
        }),
    ))
}

/// Build upload routes with a body limit derived from the audio limit
pub fn upload_routes(max_audio_bytes: usize) -> Router<AppState> {
    Router::new().route(
        "/api/v1/audio/upload",
        post(upload_audio).layer(DefaultBodyLimit::max(
            max_audio_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
        )),
    )
}
