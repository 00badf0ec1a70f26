//! Fan-out writer
//!
//! Turns the per-child analysis results into documentation entries, one
//! write per entry, in analysis order. The first failed write stops the
//! fan-out; entries already written stay. Shutdown is honored between
//! writes, never in the middle of one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kita_common::events::{EventBus, KitaEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::{ChildAnalysis, NewDocumentationEntry, Tracking};

/// Documentation-record service boundary
#[async_trait]
pub trait DocumentationStore: Send + Sync {
    /// Persist one entry and return its id
    async fn create_entry(&self, entry: &NewDocumentationEntry) -> kita_common::Result<i64>;
}

/// A write failed part-way through the fan-out
#[derive(Debug, Error)]
#[error("Documentation entry for child {child_id} failed after {written}/{expected} written: {source}")]
pub struct FanoutError {
    pub written: usize,
    pub expected: usize,
    pub child_id: i64,
    /// Stopped by shutdown rather than by a failed write
    pub cancelled: bool,
    #[source]
    pub source: kita_common::Error,
}

#[derive(Clone)]
pub struct FanoutWriter {
    store: Arc<dyn DocumentationStore>,
    event_bus: EventBus,
}

impl FanoutWriter {
    pub fn new(store: Arc<dyn DocumentationStore>, event_bus: EventBus) -> Self {
        Self { store, event_bus }
    }

    /// Write one entry per analysis result
    ///
    /// Returns the created entry ids in input order.
    pub async fn write_all(
        &self,
        results: &[ChildAnalysis],
        teacher_id: i64,
        observed_at: DateTime<Utc>,
        tracking: Tracking,
        shutdown: &CancellationToken,
    ) -> Result<Vec<i64>, FanoutError> {
        let expected = results.len();
        let mut ids = Vec::with_capacity(expected);

        for analysis in results {
            if shutdown.is_cancelled() {
                return Err(FanoutError {
                    written: ids.len(),
                    expected,
                    child_id: analysis.child_id,
                    cancelled: true,
                    source: kita_common::Error::Internal("cancelled by shutdown".to_string()),
                });
            }

            let entry =
                NewDocumentationEntry::from_analysis(analysis, teacher_id, observed_at, tracking);

            match self.store.create_entry(&entry).await {
                Ok(entry_id) => {
                    debug!(
                        process_id = %tracking,
                        entry_id,
                        child_id = analysis.child_id,
                        "Documentation entry created"
                    );
                    self.event_bus.emit_lossy(KitaEvent::DocumentationEntryCreated {
                        process_id: tracking.id(),
                        entry_id,
                        child_id: analysis.child_id,
                        timestamp: Utc::now(),
                    });
                    ids.push(entry_id);
                }
                Err(source) => {
                    warn!(
                        process_id = %tracking,
                        child_id = analysis.child_id,
                        written = ids.len(),
                        expected,
                        error = %source,
                        "Documentation entry write failed"
                    );
                    return Err(FanoutError {
                        written: ids.len(),
                        expected,
                        child_id: analysis.child_id,
                        cancelled: false,
                        source,
                    });
                }
            }
        }

        Ok(ids)
    }
}
