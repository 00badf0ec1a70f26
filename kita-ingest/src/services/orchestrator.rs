//! Analysis orchestrator
//!
//! Runs one pipeline per accepted upload, detached from the HTTP request:
//!
//! 1. Call the analysis capability with the buffered audio
//! 2. Fail on invocation errors or an empty result
//! 3. Move to `creating-documentation-entry` and fan out the entries
//! 4. Finish as `completed`, or `failed` at the first error
//!
//! Nothing is retried and nothing written is rolled back. The run is tied
//! to the service's shutdown token, never to the request that started it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::analysis_client::{AnalysisError, AnalysisRequest, AudioAnalyzer};
use super::fanout_writer::{FanoutError, FanoutWriter};
use super::progress_tracker::ProgressTracker;
use super::upload_validator::ValidatedUpload;
use crate::models::{ProcessStatus, ProcessUpdate, Tracking};

/// Work handed from the upload handler to the background task
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub tracking: Tracking,
    pub audio: Vec<u8>,
    pub content_type: String,
    pub file_name: Option<String>,
    pub teacher_id: String,
    pub observed_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(upload: ValidatedUpload, tracking: Tracking) -> Self {
        Self {
            tracking,
            audio: upload.audio,
            content_type: upload.content_type,
            file_name: upload.file_name,
            teacher_id: upload.teacher_id,
            observed_at: upload.observed_at,
        }
    }
}

/// Why a pipeline run ended in `failed`
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("analysis returned no results")]
    EmptyResult,

    #[error("teacher_id '{0}' is not a valid integer")]
    InvalidTeacherId(String),

    #[error("{0}")]
    Persistence(FanoutError),

    #[error("cancelled by shutdown")]
    Cancelled,
}

/// Final result of one run
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed { records: usize },
    Failed { error: PipelineError, records_written: usize },
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PipelineOutcome::Completed { .. })
    }

    pub fn records_written(&self) -> usize {
        match self {
            PipelineOutcome::Completed { records } => *records,
            PipelineOutcome::Failed { records_written, .. } => *records_written,
        }
    }
}

struct RunFailure {
    error: PipelineError,
    expected: Option<usize>,
    written: usize,
}

impl RunFailure {
    fn before_fanout(error: PipelineError) -> Self {
        Self {
            error,
            expected: None,
            written: 0,
        }
    }
}

/// Spawns and drives pipeline runs
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    analyzer: Arc<dyn AudioAnalyzer>,
    tracker: ProgressTracker,
    writer: FanoutWriter,
    shutdown: CancellationToken,
    slots: Option<Arc<Semaphore>>,
    tasks: TaskTracker,
}

impl AnalysisOrchestrator {
    /// `max_in_flight == 0` leaves concurrency unbounded
    pub fn new(
        analyzer: Arc<dyn AudioAnalyzer>,
        tracker: ProgressTracker,
        writer: FanoutWriter,
        shutdown: CancellationToken,
        max_in_flight: usize,
    ) -> Self {
        let slots = (max_in_flight > 0).then(|| Arc::new(Semaphore::new(max_in_flight)));
        Self {
            analyzer,
            tracker,
            writer,
            shutdown,
            slots,
            tasks: TaskTracker::new(),
        }
    }

    /// Run the pipeline in a background task
    ///
    /// The task owns the job (and its audio buffer); dropping the handle
    /// does not cancel it.
    pub fn spawn(&self, job: AnalysisJob) -> JoinHandle<PipelineOutcome> {
        let this = self.clone();
        self.tasks.spawn(async move { this.run(job).await })
    }

    /// Pipelines spawned and not yet finished
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Cancel running pipelines and wait for their tasks to finish
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Drive one job to a terminal state
    pub async fn run(&self, job: AnalysisJob) -> PipelineOutcome {
        let tracking = job.tracking;

        match self.execute(job).await {
            Ok(records) => {
                self.tracker
                    .update_with(
                        tracking,
                        ProcessUpdate::status(ProcessStatus::Completed)
                            .with_expected(records)
                            .with_written(records),
                    )
                    .await;
                info!(process_id = %tracking, records, "Pipeline completed");
                PipelineOutcome::Completed { records }
            }
            Err(failure) => {
                let mut update =
                    ProcessUpdate::failed(failure.error.to_string()).with_written(failure.written);
                if let Some(expected) = failure.expected {
                    update = update.with_expected(expected);
                }
                self.tracker.update_with(tracking, update).await;
                warn!(
                    process_id = %tracking,
                    records_written = failure.written,
                    records_expected = ?failure.expected,
                    error = %failure.error,
                    "Pipeline failed"
                );
                PipelineOutcome::Failed {
                    error: failure.error,
                    records_written: failure.written,
                }
            }
        }
    }

    async fn execute(&self, job: AnalysisJob) -> Result<usize, RunFailure> {
        let tracking = job.tracking;
        let _permit = self.acquire_slot().await?;

        debug!(process_id = %tracking, bytes = job.audio.len(), "Starting analysis");
        let request = AnalysisRequest {
            audio: job.audio,
            content_type: job.content_type,
            file_name: job.file_name,
            tracking,
        };

        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                return Err(RunFailure::before_fanout(PipelineError::Cancelled));
            }
            result = self.analyzer.analyze(request) => result,
        }
        .map_err(|e| RunFailure::before_fanout(e.into()))?;

        if !result.is_consistent() {
            return Err(RunFailure::before_fanout(
                AnalysisError::Inconsistent {
                    count: result.count,
                    entries: result.results.len(),
                }
                .into(),
            ));
        }

        if result.is_empty() {
            return Err(RunFailure::before_fanout(PipelineError::EmptyResult));
        }

        let expected = result.count;
        self.tracker
            .update_with(
                tracking,
                ProcessUpdate::status(ProcessStatus::CreatingDocumentationEntry)
                    .with_expected(expected),
            )
            .await;

        let teacher_id: i64 = job.teacher_id.trim().parse().map_err(|_| RunFailure {
            error: PipelineError::InvalidTeacherId(job.teacher_id.clone()),
            expected: Some(expected),
            written: 0,
        })?;

        let ids = self
            .writer
            .write_all(
                &result.results,
                teacher_id,
                job.observed_at,
                tracking,
                &self.shutdown,
            )
            .await
            .map_err(|e| RunFailure {
                expected: Some(e.expected),
                written: e.written,
                error: if e.cancelled {
                    PipelineError::Cancelled
                } else {
                    PipelineError::Persistence(e)
                },
            })?;

        Ok(ids.len())
    }

    /// Wait for an admission slot; the run stays `starting` meanwhile
    async fn acquire_slot(&self) -> Result<Option<OwnedSemaphorePermit>, RunFailure> {
        let Some(slots) = &self.slots else {
            return Ok(None);
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                Err(RunFailure::before_fanout(PipelineError::Cancelled))
            }
            permit = Arc::clone(slots).acquire_owned() => Ok(permit.ok()),
        }
    }
}
