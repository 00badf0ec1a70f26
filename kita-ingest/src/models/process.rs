//! Pipeline process record
//!
//! One `Process` exists per accepted upload. It is created before the
//! analysis capability is called and advanced only by the orchestrator.

use chrono::{DateTime, Utc};
use kita_common::events::ProcessStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ProcessId = i64;

/// Whether a pipeline run has a persisted process row
///
/// `Untracked` means the row could not be created; the pipeline still runs
/// but nobody can poll it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracking {
    Tracked(ProcessId),
    Untracked,
}

impl Tracking {
    pub fn id(&self) -> Option<ProcessId> {
        match self {
            Tracking::Tracked(id) => Some(*id),
            Tracking::Untracked => None,
        }
    }

    pub fn is_tracked(&self) -> bool {
        matches!(self, Tracking::Tracked(_))
    }
}

impl fmt::Display for Tracking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tracking::Tracked(id) => write!(f, "{}", id),
            Tracking::Untracked => f.write_str("untracked"),
        }
    }
}

/// Persisted pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    pub status: ProcessStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Entries returned by the analysis (None until it returned)
    pub records_expected: Option<usize>,

    /// Documentation entries persisted so far
    pub records_written: usize,

    pub failure_reason: Option<String>,
}

impl Process {
    /// Failed after at least one documentation entry was persisted
    pub fn is_partial_failure(&self) -> bool {
        self.status == ProcessStatus::Failed && self.records_written > 0
    }
}

/// Status change plus the counters that go with it
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessUpdate {
    pub status: ProcessStatus,
    pub records_expected: Option<usize>,
    pub records_written: Option<usize>,
    pub failure_reason: Option<String>,
}

impl ProcessUpdate {
    pub fn status(status: ProcessStatus) -> Self {
        Self {
            status,
            records_expected: None,
            records_written: None,
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            ..Self::status(ProcessStatus::Failed)
        }
    }

    pub fn with_expected(mut self, expected: usize) -> Self {
        self.records_expected = Some(expected);
        self
    }

    pub fn with_written(mut self, written: usize) -> Self {
        self.records_written = Some(written);
        self
    }
}
