//! Progress tracker
//!
//! Owns the `Process` record of each pipeline run. Creation happens on the
//! request path before any background work; updates come from the
//! orchestrator and are best-effort: a failed write is logged and the
//! pipeline carries on.

use async_trait::async_trait;
use chrono::Utc;
use kita_common::events::{EventBus, KitaEvent, ProcessStatus};
use kita_common::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::models::{Process, ProcessId, ProcessUpdate, Tracking};

/// Persistence boundary for process rows
#[async_trait]
pub trait ProcessStore: Send + Sync {
    /// Persist a new process and return it with its assigned id
    async fn insert(&self, status: ProcessStatus) -> Result<Process>;

    /// Apply a forward transition, returning the status it replaced
    ///
    /// Fails with `InvalidInput` for transitions the state machine forbids
    /// and `NotFound` for unknown ids.
    async fn update(&self, id: ProcessId, update: &ProcessUpdate) -> Result<ProcessStatus>;

    async fn get(&self, id: ProcessId) -> Result<Option<Process>>;
}

/// Tracks pipeline runs through their process rows
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn ProcessStore>,
    event_bus: EventBus,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProcessStore>, event_bus: EventBus) -> Self {
        Self { store, event_bus }
    }

    /// Create the process row for a freshly accepted upload
    ///
    /// Returns `Tracking::Untracked` when the row cannot be persisted; the
    /// upload has already been accepted, so this is not an error.
    pub async fn create(&self, initial_status: ProcessStatus) -> Tracking {
        match self.store.insert(initial_status).await {
            Ok(process) => {
                info!(process_id = process.id, status = %process.status, "Process created");
                self.event_bus.emit_lossy(KitaEvent::ProcessCreated {
                    process_id: process.id,
                    status: process.status,
                    timestamp: process.created_at,
                });
                Tracking::Tracked(process.id)
            }
            Err(e) => {
                error!(error = %e, "Failed to create process, pipeline will run untracked");
                Tracking::Untracked
            }
        }
    }

    /// Advance to `status` without touching counters
    pub async fn update(&self, tracking: Tracking, status: ProcessStatus) -> bool {
        self.update_with(tracking, ProcessUpdate::status(status)).await
    }

    /// Apply a status change with counters, best-effort
    ///
    /// Returns whether the change was persisted. Never fails the caller.
    pub async fn update_with(&self, tracking: Tracking, update: ProcessUpdate) -> bool {
        let Tracking::Tracked(process_id) = tracking else {
            debug!(status = %update.status, "Untracked pipeline, skipping status update");
            return false;
        };

        match self.store.update(process_id, &update).await {
            Ok(old_status) => {
                info!(
                    process_id,
                    old_status = %old_status,
                    new_status = %update.status,
                    records_written = ?update.records_written,
                    records_expected = ?update.records_expected,
                    "Process status updated"
                );
                self.event_bus.emit_lossy(KitaEvent::ProcessStatusChanged {
                    process_id,
                    old_status,
                    new_status: update.status,
                    records_written: update.records_written.unwrap_or(0),
                    records_expected: update.records_expected,
                    failure_reason: update.failure_reason.clone(),
                    timestamp: Utc::now(),
                });
                true
            }
            Err(e) => {
                warn!(
                    process_id,
                    status = %update.status,
                    error = %e,
                    "Failed to persist process status update"
                );
                false
            }
        }
    }

    /// Look up a process for polling
    pub async fn get_by_id(&self, id: ProcessId) -> Result<Process> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Process {} not found", id)))
    }
}
