//! Process database operations
//!
//! Status updates are compare-and-set: the stored status must be a legal
//! predecessor of the new one, so a terminal row can never change again.

use async_trait::async_trait;
use chrono::Utc;
use kita_common::events::ProcessStatus;
use kita_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::parse_timestamp;
use crate::models::{Process, ProcessId, ProcessUpdate};
use crate::services::ProcessStore;
use crate::utils::retry_on_lock;

/// SQLite-backed process store
#[derive(Clone)]
pub struct SqliteProcessStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteProcessStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    /// Fail every process left non-terminal by a previous run
    ///
    /// Pipelines run in tasks that die with the service, so such rows can
    /// never progress.
    pub async fn fail_stale(&self, reason: &str) -> Result<usize> {
        let result = sqlx::query(
            r#"
            UPDATE processes
            SET status = ?, failure_reason = ?, updated_at = ?
            WHERE status NOT IN (?, ?)
            "#,
        )
        .bind(ProcessStatus::Failed.as_str())
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .bind(ProcessStatus::Completed.as_str())
        .bind(ProcessStatus::Failed.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    /// Total number of process rows
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ProcessStore for SqliteProcessStore {
    async fn insert(&self, status: ProcessStatus) -> Result<Process> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let pool = &self.pool;

        let id = retry_on_lock("insert_process", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                r#"
                INSERT INTO processes (status, records_written, created_at, updated_at)
                VALUES (?, 0, ?, ?)
                "#,
            )
            .bind(status.as_str())
            .bind(&now_str)
            .bind(&now_str)
            .execute(pool)
            .await?;

            Ok(result.last_insert_rowid())
        })
        .await?;

        Ok(Process {
            id,
            status,
            created_at: now,
            updated_at: now,
            records_expected: None,
            records_written: 0,
            failure_reason: None,
        })
    }

    async fn update(&self, id: ProcessId, update: &ProcessUpdate) -> Result<ProcessStatus> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Process {} not found", id)))?
            .status;

        if current.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "Process {} already {}",
                id, current
            )));
        }
        if !current.can_transition_to(update.status) {
            return Err(Error::InvalidInput(format!(
                "Process {} cannot move from {} to {}",
                id, current, update.status
            )));
        }

        let records_expected = update.records_expected.map(|n| n as i64);
        let records_written = update.records_written.map(|n| n as i64);
        let updated_at = Utc::now().to_rfc3339();
        let pool = &self.pool;

        // Compare-and-set on the status read above
        let rows = retry_on_lock("update_process", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                r#"
                UPDATE processes
                SET status = ?,
                    records_expected = COALESCE(?, records_expected),
                    records_written = COALESCE(?, records_written),
                    failure_reason = COALESCE(?, failure_reason),
                    updated_at = ?
                WHERE id = ? AND status = ?
                "#,
            )
            .bind(update.status.as_str())
            .bind(records_expected)
            .bind(records_written)
            .bind(update.failure_reason.as_deref())
            .bind(&updated_at)
            .bind(id)
            .bind(current.as_str())
            .execute(pool)
            .await?;

            Ok(result.rows_affected())
        })
        .await?;

        if rows == 0 {
            return Err(Error::Internal(format!(
                "Process {} changed concurrently while moving to {}",
                id, update.status
            )));
        }

        Ok(current)
    }

    async fn get(&self, id: ProcessId) -> Result<Option<Process>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, records_expected, records_written, failure_reason,
                   created_at, updated_at
            FROM processes
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| process_from_row(&row)).transpose()
    }
}

fn process_from_row(row: &SqliteRow) -> Result<Process> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let records_expected: Option<i64> = row.get("records_expected");
    let records_written: i64 = row.get("records_written");

    Ok(Process {
        id: row.get("id"),
        status: status.parse()?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        records_expected: records_expected.map(|n| n.max(0) as usize),
        records_written: records_written.max(0) as usize,
        failure_reason: row.get("failure_reason"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, SqliteProcessStore) {
        let dir = TempDir::new().unwrap();
        let pool = crate::db::init_database_pool(&dir.path().join("kita.db"))
            .await
            .unwrap();
        (dir, SqliteProcessStore::new(pool, 1000))
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let (_dir, store) = test_store().await;

        let first = store.insert(ProcessStatus::Starting).await.unwrap();
        let second = store.insert(ProcessStatus::Starting).await.unwrap();

        assert!(second.id > first.id);
        assert_eq!(store.count().await.unwrap(), 2);

        let loaded = store.get(first.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ProcessStatus::Starting);
        assert_eq!(loaded.records_written, 0);
        assert_eq!(loaded.records_expected, None);
    }

    #[tokio::test]
    async fn forward_updates_apply_counters() {
        let (_dir, store) = test_store().await;
        let process = store.insert(ProcessStatus::Starting).await.unwrap();

        store
            .update(
                process.id,
                &ProcessUpdate::status(ProcessStatus::CreatingDocumentationEntry).with_expected(3),
            )
            .await
            .unwrap();
        store
            .update(process.id, &ProcessUpdate::failed("write failed").with_written(1))
            .await
            .unwrap();

        let loaded = store.get(process.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ProcessStatus::Failed);
        assert_eq!(loaded.records_expected, Some(3));
        assert_eq!(loaded.records_written, 1);
        assert_eq!(loaded.failure_reason.as_deref(), Some("write failed"));
        assert!(loaded.is_partial_failure());
    }

    #[tokio::test]
    async fn terminal_process_is_immutable() {
        let (_dir, store) = test_store().await;
        let process = store.insert(ProcessStatus::Starting).await.unwrap();

        store
            .update(process.id, &ProcessUpdate::failed("analysis failed"))
            .await
            .unwrap();

        let result = store
            .update(
                process.id,
                &ProcessUpdate::status(ProcessStatus::CreatingDocumentationEntry),
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let loaded = store.get(process.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ProcessStatus::Failed);
    }

    #[tokio::test]
    async fn completed_reachable_after_missed_intermediate_write() {
        let (_dir, store) = test_store().await;
        let process = store.insert(ProcessStatus::Starting).await.unwrap();

        let previous = store
            .update(
                process.id,
                &ProcessUpdate::status(ProcessStatus::Completed)
                    .with_expected(2)
                    .with_written(2),
            )
            .await
            .unwrap();
        assert_eq!(previous, ProcessStatus::Starting);

        let loaded = store.get(process.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ProcessStatus::Completed);
        assert_eq!(loaded.records_expected, Some(2));
        assert_eq!(loaded.records_written, 2);

        // Finished, so the restart sweep leaves it alone
        assert_eq!(store.fail_stale("restarted").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn moving_backwards_is_rejected() {
        let (_dir, store) = test_store().await;
        let process = store.insert(ProcessStatus::Starting).await.unwrap();
        store
            .update(
                process.id,
                &ProcessUpdate::status(ProcessStatus::CreatingDocumentationEntry),
            )
            .await
            .unwrap();

        let result = store
            .update(process.id, &ProcessUpdate::status(ProcessStatus::Starting))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn update_unknown_process_is_not_found() {
        let (_dir, store) = test_store().await;

        let result = store.update(999, &ProcessUpdate::failed("nope")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(store.get(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fail_stale_marks_only_running_processes() {
        let (_dir, store) = test_store().await;
        let running = store.insert(ProcessStatus::Starting).await.unwrap();
        let done = store.insert(ProcessStatus::Starting).await.unwrap();
        store
            .update(
                done.id,
                &ProcessUpdate::status(ProcessStatus::CreatingDocumentationEntry),
            )
            .await
            .unwrap();
        store
            .update(done.id, &ProcessUpdate::status(ProcessStatus::Completed))
            .await
            .unwrap();

        let swept = store.fail_stale("restarted").await.unwrap();
        assert_eq!(swept, 1);

        let running = store.get(running.id).await.unwrap().unwrap();
        assert_eq!(running.status, ProcessStatus::Failed);
        assert_eq!(running.failure_reason.as_deref(), Some("restarted"));

        let done = store.get(done.id).await.unwrap().unwrap();
        assert_eq!(done.status, ProcessStatus::Completed);
    }
}
