//! Analysis capability result types
//!
//! Wire format returned by the speech/categorization service:
//!
//! ```json
//! {"count": 1, "results": [{"child_id": 7, "summary": "...", "category": {"id": 3, "name": "Language"}}]}
//! ```

use serde::{Deserialize, Serialize};

/// Category assigned by the analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
}

/// Per-child summary extracted from the recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildAnalysis {
    pub child_id: i64,
    pub summary: String,
    pub category: CategoryRef,
}

/// Analysis output for one audio buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub count: usize,
    #[serde(default)]
    pub results: Vec<ChildAnalysis>,
}

impl AnalysisResult {
    /// `count` agrees with the number of entries
    pub fn is_consistent(&self) -> bool {
        self.count == self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
