//! Documentation entry database operations
//!
//! Stand-in for the documentation-record service: one insert per entry, no
//! batching. Concurrent inserts from independent pipelines are serialized by
//! SQLite.

use async_trait::async_trait;
use chrono::Utc;
use kita_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::parse_timestamp;
use crate::models::{DocumentationEntry, NewDocumentationEntry, ProcessId};
use crate::services::DocumentationStore;
use crate::utils::retry_on_lock;

/// SQLite-backed documentation entry store
#[derive(Clone)]
pub struct SqliteDocumentationStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteDocumentationStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    /// Entries produced by one pipeline run, in write order
    pub async fn list_by_process(&self, process_id: ProcessId) -> Result<Vec<DocumentationEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, child_id, teacher_id, category_id, observed_at, description,
                   approved, approved_by, process_id, created_at
            FROM documentation_entries
            WHERE process_id = ?
            ORDER BY id
            "#,
        )
        .bind(process_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Total number of entries
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documentation_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl DocumentationStore for SqliteDocumentationStore {
    async fn create_entry(&self, entry: &NewDocumentationEntry) -> Result<i64> {
        let observed_at = entry.observed_at.to_rfc3339();
        let created_at = Utc::now().to_rfc3339();
        let pool = &self.pool;

        retry_on_lock("create_documentation_entry", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                r#"
                INSERT INTO documentation_entries (
                    child_id, teacher_id, category_id, observed_at, description,
                    approved, approved_by, process_id, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.child_id)
            .bind(entry.teacher_id)
            .bind(entry.category_id)
            .bind(&observed_at)
            .bind(&entry.description)
            .bind(entry.approved)
            .bind(entry.approved_by)
            .bind(entry.process_id)
            .bind(&created_at)
            .execute(pool)
            .await?;

            Ok(result.last_insert_rowid())
        })
        .await
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<DocumentationEntry> {
    let observed_at: String = row.get("observed_at");
    let created_at: String = row.get("created_at");

    Ok(DocumentationEntry {
        id: row.get("id"),
        child_id: row.get("child_id"),
        teacher_id: row.get("teacher_id"),
        category_id: row.get("category_id"),
        observed_at: parse_timestamp("observed_at", &observed_at)?,
        description: row.get("description"),
        approved: row.get("approved"),
        approved_by: row.get("approved_by"),
        process_id: row.get("process_id"),
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}
