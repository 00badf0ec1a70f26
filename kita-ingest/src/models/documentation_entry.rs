//! Observation records produced by the fan-out writer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChildAnalysis, Tracking};

/// Fully built entry ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocumentationEntry {
    pub child_id: i64,
    pub teacher_id: i64,
    pub category_id: i64,
    /// Taken from the upload's timestamp field, not from the write time
    pub observed_at: DateTime<Utc>,
    pub description: String,
    pub approved: bool,
    pub approved_by: Option<i64>,
    pub process_id: Option<i64>,
}

impl NewDocumentationEntry {
    /// Build an unapproved entry from one analysis result
    pub fn from_analysis(
        analysis: &ChildAnalysis,
        teacher_id: i64,
        observed_at: DateTime<Utc>,
        tracking: Tracking,
    ) -> Self {
        Self {
            child_id: analysis.child_id,
            teacher_id,
            category_id: analysis.category.id,
            observed_at,
            description: analysis.summary.clone(),
            approved: false,
            approved_by: None,
            process_id: tracking.id(),
        }
    }
}

/// Persisted documentation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentationEntry {
    pub id: i64,
    pub child_id: i64,
    pub teacher_id: i64,
    pub category_id: i64,
    pub observed_at: DateTime<Utc>,
    pub description: String,
    pub approved: bool,
    pub approved_by: Option<i64>,
    pub process_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
