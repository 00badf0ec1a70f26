//! kita-ingest library interface
//!
//! Audio upload → analysis → documentation entries pipeline. Exposes the
//! router and state so integration tests can drive the service in-process.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::{middleware, routing::get, Router};
use chrono::{DateTime, Utc};
use kita_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::IngestConfig;
use crate::db::{SqliteDocumentationStore, SqliteProcessStore};
use crate::services::{
    AnalysisOrchestrator, AudioAnalyzer, DocumentationStore, FanoutWriter, ProcessStore,
    ProgressTracker, UploadValidator,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<IngestConfig>,
    pub validator: UploadValidator,
    pub tracker: ProgressTracker,
    pub orchestrator: AnalysisOrchestrator,
    /// Read side of the documentation entries, for the polling endpoint
    pub documentation: SqliteDocumentationStore,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// State backed by the SQLite stores in `db`
    pub fn new(
        db: SqlitePool,
        config: IngestConfig,
        analyzer: Arc<dyn AudioAnalyzer>,
        event_bus: EventBus,
        shutdown: CancellationToken,
    ) -> Self {
        let lock_wait = config.database.max_lock_wait_ms;
        let processes = Arc::new(SqliteProcessStore::new(db.clone(), lock_wait));
        let entries = Arc::new(SqliteDocumentationStore::new(db.clone(), lock_wait));
        Self::with_stores(db, config, analyzer, processes, entries, event_bus, shutdown)
    }

    /// State with explicit write-side stores
    pub fn with_stores(
        db: SqlitePool,
        config: IngestConfig,
        analyzer: Arc<dyn AudioAnalyzer>,
        processes: Arc<dyn ProcessStore>,
        entries: Arc<dyn DocumentationStore>,
        event_bus: EventBus,
        shutdown: CancellationToken,
    ) -> Self {
        let tracker = ProgressTracker::new(processes, event_bus.clone());
        let writer = FanoutWriter::new(entries, event_bus.clone());
        let orchestrator = AnalysisOrchestrator::new(
            analyzer,
            tracker.clone(),
            writer,
            shutdown,
            config.pipeline.max_in_flight,
        );

        Self {
            documentation: SqliteDocumentationStore::new(
                db.clone(),
                config.database.max_lock_wait_ms,
            ),
            db,
            validator: UploadValidator::new(&config.upload),
            config: Arc::new(config),
            tracker,
            orchestrator,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// `/api/v1/*` sits behind the token check; `/health` does not.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(api::upload_routes(state.config.upload.max_bytes))
        .route("/api/v1/processes/events", get(api::process_event_stream))
        .merge(api::process_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
