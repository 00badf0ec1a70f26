//! Pipeline process type definitions
//!
//! Supporting types for kita-ingest progress tracking.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of one audio-to-documentation pipeline run
///
/// Forward-only state machine. Both terminal states can be entered from
/// either non-terminal state, so a missed intermediate write never strands
/// a finished run:
///
/// ```text
/// starting ──▶ creating-documentation-entry ──▶ completed
///    │                     │                        ▲
///    ├─────────────────────┼────────────────────────┘
///    └─────────────────────┴──────────────────▶ failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessStatus {
    /// Accepted, analysis not yet returned
    Starting,
    /// Analysis returned entries, documentation entries are being written
    CreatingDocumentationEntry,
    /// Every documentation entry was written
    Completed,
    /// Pipeline stopped; see the failure reason on the process
    Failed,
}

impl ProcessStatus {
    /// Stored / wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Starting => "starting",
            ProcessStatus::CreatingDocumentationEntry => "creating-documentation-entry",
            ProcessStatus::Completed => "completed",
            ProcessStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessStatus::Completed | ProcessStatus::Failed)
    }

    /// States from which `self` may be entered
    pub fn predecessors(&self) -> &'static [ProcessStatus] {
        match self {
            ProcessStatus::Starting => &[],
            ProcessStatus::CreatingDocumentationEntry => &[ProcessStatus::Starting],
            ProcessStatus::Completed | ProcessStatus::Failed => &[
                ProcessStatus::Starting,
                ProcessStatus::CreatingDocumentationEntry,
            ],
        }
    }

    pub fn can_transition_to(&self, next: ProcessStatus) -> bool {
        next.predecessors().contains(self)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(ProcessStatus::Starting),
            "creating-documentation-entry" => Ok(ProcessStatus::CreatingDocumentationEntry),
            "completed" => Ok(ProcessStatus::Completed),
            "failed" => Ok(ProcessStatus::Failed),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown process status: {}",
                other
            ))),
        }
    }
}
