//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok" or "shutting-down")
    pub status: String,
    /// Module name ("kita-ingest")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Git commit captured at build time
    pub git_hash: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Pipelines spawned and not yet finished
    pub pipelines_in_flight: usize,
}

/// GET /health
///
/// Not behind the API token, for monitoring.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let status = if state.orchestrator.shutdown_token().is_cancelled() {
        "shutting-down"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: crate::config::SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        pipelines_in_flight: state.orchestrator.in_flight(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
