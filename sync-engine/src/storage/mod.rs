//! Durable storage for the engine.
//!
//! One SQLite database holds the change queue and the per-scope
//! last-success timestamps. WAL journal with `synchronous = FULL`: once a
//! write returns, it survives a crash.

mod queue;

pub use queue::{ChangeQueue, FailOutcome};

use crate::error::StorageError;
use dsync_core::RetryPolicy;
use dsync_types::{Scope, Timestamp};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-backed engine storage.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if path.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath {
                path: path.to_path_buf(),
            });
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory database (for testing).
    ///
    /// The pool keeps its single connection alive forever; dropping it
    /// would drop the database.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS change_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                domain TEXT NOT NULL,
                operation TEXT NOT NULL,
                payload BLOB NOT NULL,
                enqueued_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_attempt_at INTEGER,
                next_attempt_at INTEGER,
                dead_letter INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_timestamps (
                scope TEXT PRIMARY KEY,
                at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_change_queue_domain ON change_queue(domain, dead_letter, seq)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The change queue stored in this database.
    pub fn change_queue(&self, retry: RetryPolicy) -> ChangeQueue {
        ChangeQueue::new(self.pool.clone(), retry)
    }

    /// Every persisted last-success timestamp.
    ///
    /// Rows whose scope is no longer known are skipped.
    pub async fn load_timestamps(&self) -> Result<Vec<(Scope, Timestamp)>, StorageError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT scope, at FROM sync_timestamps ORDER BY scope")
                .fetch_all(&self.pool)
                .await?;

        let mut out = Vec::with_capacity(rows.len());
        for (scope, at) in rows {
            match scope.parse::<Scope>() {
                Ok(scope) => out.push((scope, Timestamp::from_millis(at.max(0) as u64))),
                Err(_) => tracing::warn!(scope = %scope, "Ignoring timestamp for unknown scope"),
            }
        }
        Ok(out)
    }

    /// Persist a last-success timestamp.
    ///
    /// Never moves a stored timestamp backwards.
    pub async fn save_timestamp(&self, scope: Scope, at: Timestamp) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO sync_timestamps (scope, at)
            VALUES (?1, ?2)
            ON CONFLICT(scope) DO UPDATE SET at = MAX(sync_timestamps.at, excluded.at)
            "#,
        )
        .bind(scope.as_str())
        .bind(at.as_millis() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Forget every persisted timestamp.
    pub async fn clear_timestamps(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM sync_timestamps")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Close the pool, flushing pending writes.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
