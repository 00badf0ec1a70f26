//! Database access for kita-ingest
//!
//! SQLite tables owned by the pipeline: `processes` and `documentation_entries`.

pub mod documentation_entries;
pub mod processes;

pub use documentation_entries::SqliteDocumentationStore;
pub use processes::SqliteProcessStore;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the database file (and parent directory) if missing, then the tables.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create pipeline tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            status TEXT NOT NULL,
            records_expected INTEGER,
            records_written INTEGER NOT NULL DEFAULT 0,
            failure_reason TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documentation_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            child_id INTEGER NOT NULL,
            teacher_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            observed_at TEXT NOT NULL,
            description TEXT NOT NULL,
            approved INTEGER NOT NULL DEFAULT 0,
            approved_by INTEGER,
            process_id INTEGER,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documentation_entries_process ON documentation_entries(process_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (processes, documentation_entries)");

    Ok(())
}

/// Parse an RFC3339 column value
pub(crate) fn parse_timestamp(
    column: &str,
    value: &str,
) -> kita_common::Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| kita_common::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
