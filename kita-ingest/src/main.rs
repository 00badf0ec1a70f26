//! kita-ingest - Audio observation ingest service
//!
//! Accepts audio recordings from staff, runs them through the analysis
//! capability in the background and writes one documentation entry per
//! recognized child.

use anyhow::{Context, Result};
use clap::Parser;
use kita_common::config::{ensure_root_folder, find_config_file, resolve_root_folder, ENV_ROOT_FOLDER};
use kita_common::events::EventBus;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kita_ingest::config::{IngestConfig, SERVICE_NAME};
use kita_ingest::db::SqliteProcessStore;
use kita_ingest::services::HttpAudioAnalyzer;
use kita_ingest::{build_router, AppState};

const STALE_PROCESS_REASON: &str = "service restarted before pipeline finished";

/// Command-line arguments for kita-ingest
#[derive(Parser, Debug)]
#[command(name = "kita-ingest")]
#[command(about = "Audio observation ingest service for Kita")]
#[command(version)]
struct Args {
    /// TOML configuration file (default: ~/.config/kita/kita-ingest.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder holding kita.db
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Listen address, overrides config and KITA_BIND_ADDRESS
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(|| find_config_file(SERVICE_NAME));
    let mut config = IngestConfig::load(config_path.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .init();

    // Build identification first, before any slow startup work
    info!(
        "Starting Kita Ingest ({}) v{} [{}] built {} ({})",
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    let root_folder = resolve_root_folder(
        args.root_folder.as_deref(),
        ENV_ROOT_FOLDER,
        config.root_folder.as_deref(),
    );
    let db_path = ensure_root_folder(&root_folder)
        .with_context(|| format!("Failed to initialize root folder {}", root_folder.display()))?;
    info!("Database: {}", db_path.display());

    let pool = kita_ingest::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let swept = SqliteProcessStore::new(pool.clone(), config.database.max_lock_wait_ms)
        .fail_stale(STALE_PROCESS_REASON)
        .await?;
    if swept > 0 {
        warn!(swept, "Marked processes left over from a previous run as failed");
    }

    let analyzer = HttpAudioAnalyzer::new(&config.analysis)
        .map_err(|e| anyhow::anyhow!("Failed to create analysis client: {}", e))?;
    info!("Analysis service: {}", analyzer.endpoint());

    if config.api_token.is_none() {
        warn!("No api_token configured, /api/v1 is open to any caller");
    }

    let bind_address = config.bind_address.clone();
    let event_bus = EventBus::new(100);
    let shutdown = CancellationToken::new();
    let state = AppState::new(
        pool,
        config,
        Arc::new(analyzer),
        event_bus,
        shutdown.clone(),
    );
    let orchestrator = state.orchestrator.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    let in_flight = orchestrator.in_flight();
    if in_flight > 0 {
        info!(in_flight, "Waiting for running pipelines to stop");
    }
    orchestrator.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C / SIGTERM and cancels the pipeline token
///
/// Cancelling here also ends open SSE streams, which would otherwise keep
/// graceful shutdown waiting.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }

    shutdown.cancel();
}
