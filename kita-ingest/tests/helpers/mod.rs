//! Test Helper Utilities
//!
//! In-process service with an on-disk SQLite database, a scripted analyzer
//! and multipart request builders.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use kita_common::events::EventBus;
use kita_ingest::config::IngestConfig;
use kita_ingest::db::{SqliteDocumentationStore, SqliteProcessStore};
use kita_ingest::models::{AnalysisResult, CategoryRef, ChildAnalysis, NewDocumentationEntry, Process};
use kita_ingest::services::{
    AnalysisError, AnalysisRequest, AudioAnalyzer, DocumentationStore, ProcessStore,
};
use kita_ingest::{build_router, AppState};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const BOUNDARY: &str = "kita-integration-boundary";
pub const OBSERVED_AT: &str = "2024-05-14T10:15:00Z";

/// Scripted analysis capability
pub struct StubAnalyzer {
    reply: Reply,
    pub calls: AtomicUsize,
}

pub enum Reply {
    Result(AnalysisResult),
    Error(u16),
    Pending,
}

impl StubAnalyzer {
    pub fn returning(children: &[(i64, &str)]) -> Arc<Self> {
        Arc::new(Self {
            reply: Reply::Result(analysis(children)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_reply(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioAnalyzer for StubAnalyzer {
    async fn analyze(&self, _request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Result(result) => Ok(result.clone()),
            Reply::Error(status) => Err(AnalysisError::Api(*status, "analysis down".to_string())),
            Reply::Pending => std::future::pending().await,
        }
    }
}

pub fn analysis(children: &[(i64, &str)]) -> AnalysisResult {
    AnalysisResult {
        count: children.len(),
        results: children
            .iter()
            .map(|(child_id, summary)| ChildAnalysis {
                child_id: *child_id,
                summary: summary.to_string(),
                category: CategoryRef {
                    id: 3,
                    name: "Language".to_string(),
                },
            })
            .collect(),
    }
}

/// SQLite entry store that fails its n-th write (1-based)
pub struct FailingDocumentationStore {
    inner: SqliteDocumentationStore,
    fail_on_write: usize,
    attempts: AtomicUsize,
}

#[async_trait]
impl DocumentationStore for FailingDocumentationStore {
    async fn create_entry(&self, entry: &NewDocumentationEntry) -> kita_common::Result<i64> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == self.fail_on_write {
            return Err(kita_common::Error::Internal("documentation service unavailable".to_string()));
        }
        self.inner.create_entry(entry).await
    }
}

/// Process store whose inserts always fail
pub struct UnavailableProcessStore;

#[async_trait]
impl ProcessStore for UnavailableProcessStore {
    async fn insert(&self, _status: kita_ingest::models::ProcessStatus) -> kita_common::Result<Process> {
        Err(kita_common::Error::Internal("process table unavailable".to_string()))
    }

    async fn update(
        &self,
        id: i64,
        _update: &kita_ingest::models::ProcessUpdate,
    ) -> kita_common::Result<kita_ingest::models::ProcessStatus> {
        Err(kita_common::Error::NotFound(format!("Process {} not found", id)))
    }

    async fn get(&self, _id: i64) -> kita_common::Result<Option<Process>> {
        Ok(None)
    }
}

pub fn test_config() -> IngestConfig {
    let mut config = IngestConfig::default();
    config.upload.max_bytes = 1024;
    config.database.max_lock_wait_ms = 1000;
    config
}

/// Service under test; keeps the temp dir alive
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub pool: SqlitePool,
    pub shutdown: CancellationToken,
    _dir: TempDir,
}

pub enum Stores {
    Sqlite,
    FailingEntries(usize),
    NoProcesses,
}

impl TestApp {
    pub async fn new(analyzer: Arc<StubAnalyzer>) -> Self {
        Self::build(analyzer, test_config(), Stores::Sqlite).await
    }

    pub async fn build(analyzer: Arc<StubAnalyzer>, config: IngestConfig, stores: Stores) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = kita_ingest::db::init_database_pool(&dir.path().join("kita.db"))
            .await
            .unwrap();
        let lock_wait = config.database.max_lock_wait_ms;
        let shutdown = CancellationToken::new();

        let sqlite_processes: Arc<dyn ProcessStore> =
            Arc::new(SqliteProcessStore::new(pool.clone(), lock_wait));
        let sqlite_entries = SqliteDocumentationStore::new(pool.clone(), lock_wait);

        let (processes, entries): (Arc<dyn ProcessStore>, Arc<dyn DocumentationStore>) =
            match stores {
                Stores::Sqlite => (sqlite_processes, Arc::new(sqlite_entries)),
                Stores::FailingEntries(n) => (
                    sqlite_processes,
                    Arc::new(FailingDocumentationStore {
                        inner: sqlite_entries,
                        fail_on_write: n,
                        attempts: AtomicUsize::new(0),
                    }),
                ),
                Stores::NoProcesses => (Arc::new(UnavailableProcessStore), Arc::new(sqlite_entries)),
            };

        let state = AppState::with_stores(
            pool.clone(),
            config,
            analyzer,
            processes,
            entries,
            EventBus::new(100),
            shutdown.clone(),
        );

        Self {
            router: build_router(state.clone()),
            state,
            pool,
            shutdown,
            _dir: dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        json_response(response).await
    }

    /// Poll the process until it reaches a terminal status
    pub async fn wait_for_terminal(&self, process_id: i64) -> Value {
        let uri = format!("/api/v1/processes/{}", process_id);
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let (status, body) = self.get_json(&uri).await;
                assert_eq!(status, StatusCode::OK);
                if body["status"] == "completed" || body["status"] == "failed" {
                    return body;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("process did not reach a terminal status")
    }

    /// Wait until every spawned pipeline finished
    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.state.orchestrator.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("pipelines did not finish");
    }

    pub async fn process_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM processes")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub async fn entry_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM documentation_entries")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

pub async fn json_response(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

/// One part of a multipart/form-data body
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, content_type, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"recording\"\r\nContent-Type: {}\r\n\r\n",
                        name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/audio/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// Well-formed upload with the given audio type and teacher id
pub fn valid_upload(content_type: &str, teacher_id: &str) -> Request<Body> {
    upload_request(&[
        Part::File("audio", content_type, b"RIFF....WAVEfmt "),
        Part::Text("teacher_id", teacher_id),
        Part::Text("timestamp", OBSERVED_AT),
    ])
}
