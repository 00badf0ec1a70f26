//! Data models for kita-ingest
//!
//! - Process: pollable state of one pipeline run
//! - AnalysisResult: output of the external analysis capability
//! - DocumentationEntry: observation record written by the fan-out

pub mod analysis;
pub mod documentation_entry;
pub mod process;

pub use analysis::{AnalysisResult, CategoryRef, ChildAnalysis};
pub use documentation_entry::{DocumentationEntry, NewDocumentationEntry};
pub use process::{Process, ProcessId, ProcessUpdate, Tracking};
pub use kita_common::events::ProcessStatus;
