//! Durable FIFO queue of local changes waiting to be pushed.
//!
//! Order within a domain is the insertion sequence. Entries leave the live
//! queue only through `ack` (confirmed push) or by exhausting their retry
//! budget, which moves them to the dead-letter set instead of deleting
//! them.

use crate::error::StorageError;
use dsync_core::RetryPolicy;
use dsync_types::{ChangeOperation, ChangeQueueEntry, Domain, EntryId, Timestamp};
use sqlx::sqlite::SqlitePool;

/// What `fail` did with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// No live entry with that id. Nothing changed.
    Unknown,
    /// The entry stays queued for another attempt.
    Retrying {
        /// Failed attempts so far.
        attempts: u32,
    },
    /// The entry used up its budget and was dead-lettered.
    DeadLettered {
        /// Failed attempts so far.
        attempts: u32,
    },
}

/// Durable per-domain change queue.
#[derive(Clone)]
pub struct ChangeQueue {
    pool: SqlitePool,
    retry: RetryPolicy,
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: String,
    domain: String,
    operation: String,
    payload: Vec<u8>,
    enqueued_at: i64,
    attempts: i64,
    last_attempt_at: Option<i64>,
    next_attempt_at: Option<i64>,
    last_error: Option<String>,
}

impl TryFrom<EntryRow> for ChangeQueueEntry {
    type Error = StorageError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StorageError::Corrupt {
            table: "change_queue",
            reason,
        };
        Ok(ChangeQueueEntry {
            id: row
                .id
                .parse()
                .map_err(|e| corrupt(format!("entry id {}: {e}", row.id)))?,
            domain: row.domain.parse().map_err(|e| corrupt(format!("{e}")))?,
            operation: row.operation.parse().map_err(|e| corrupt(format!("{e}")))?,
            payload: rmp_serde::from_slice(&row.payload)?,
            enqueued_at: millis(row.enqueued_at),
            attempts: row.attempts.max(0) as u32,
            last_attempt_at: row.last_attempt_at.map(millis),
            next_attempt_at: row.next_attempt_at.map(millis),
            last_error: row.last_error,
        })
    }
}

fn millis(value: i64) -> Timestamp {
    Timestamp::from_millis(value.max(0) as u64)
}

const ENTRY_COLUMNS: &str = "id, domain, operation, payload, enqueued_at, attempts, \
     last_attempt_at, next_attempt_at, last_error";

impl ChangeQueue {
    pub(crate) fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    /// Attempts allowed before dead-lettering.
    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts
    }

    /// Append a change. The row is committed before this returns.
    pub async fn enqueue(
        &self,
        domain: Domain,
        operation: ChangeOperation,
        payload: &serde_json::Value,
    ) -> Result<EntryId, StorageError> {
        let id = EntryId::new();
        let encoded = rmp_serde::to_vec(payload)?;

        sqlx::query(
            r#"
            INSERT INTO change_queue (id, domain, operation, payload, enqueued_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(id.to_string())
        .bind(domain.as_str())
        .bind(operation.as_str())
        .bind(&encoded)
        .bind(Timestamp::now().as_millis() as i64)
        .execute(&self.pool)
        .await?;

        tracing::debug!(%domain, entry_id = %id, %operation, "Change queued");
        Ok(id)
    }

    /// Live entries of a domain, oldest first. Does not remove anything.
    pub async fn drain(&self, domain: Domain) -> Result<Vec<ChangeQueueEntry>, StorageError> {
        self.drain_limit(domain, None).await
    }

    /// Like [`drain`](Self::drain), returning at most `limit` entries.
    pub async fn drain_limit(
        &self,
        domain: Domain,
        limit: Option<usize>,
    ) -> Result<Vec<ChangeQueueEntry>, StorageError> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM change_queue
            WHERE domain = ?1 AND dead_letter = 0
            ORDER BY seq ASC
            LIMIT ?2
            "#
        ))
        .bind(domain.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChangeQueueEntry::try_from).collect()
    }

    /// Remove an entry after a confirmed push.
    ///
    /// Returns whether a live entry was removed; unknown ids are a no-op.
    pub async fn ack(&self, id: EntryId) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM change_queue WHERE id = ?1 AND dead_letter = 0")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a failed push attempt.
    ///
    /// The entry keeps its position and is not due again until its backoff
    /// delay has passed. Once its attempts reach the budget it moves to the
    /// dead-letter set. Unknown ids are a no-op.
    pub async fn fail(&self, id: EntryId, error: &str) -> Result<FailOutcome, StorageError> {
        let mut tx = self.pool.begin().await?;

        let attempts: Option<i64> = sqlx::query_scalar(
            "SELECT attempts FROM change_queue WHERE id = ?1 AND dead_letter = 0",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(attempts) = attempts else {
            tx.rollback().await?;
            return Ok(FailOutcome::Unknown);
        };

        let attempts = attempts.max(0) as u32 + 1;
        let dead = self.retry.is_exhausted(attempts);
        let now = Timestamp::now();
        let next_attempt_at = if dead {
            None
        } else {
            Some(self.retry.next_attempt_at(attempts, now).as_millis() as i64)
        };

        sqlx::query(
            r#"
            UPDATE change_queue
            SET attempts = ?2, last_attempt_at = ?3, next_attempt_at = ?4,
                last_error = ?5, dead_letter = ?6
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(attempts as i64)
        .bind(now.as_millis() as i64)
        .bind(next_attempt_at)
        .bind(error)
        .bind(dead)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if dead {
            Ok(FailOutcome::DeadLettered { attempts })
        } else {
            Ok(FailOutcome::Retrying { attempts })
        }
    }

    /// Number of live entries, for one domain or all of them.
    pub async fn size(&self, domain: Option<Domain>) -> Result<usize, StorageError> {
        let count: i64 = match domain {
            Some(domain) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM change_queue WHERE domain = ?1 AND dead_letter = 0",
                )
                .bind(domain.as_str())
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM change_queue WHERE dead_letter = 0")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count.max(0) as usize)
    }

    /// Dead-lettered entries, oldest first.
    pub async fn dead_letters(
        &self,
        domain: Option<Domain>,
    ) -> Result<Vec<ChangeQueueEntry>, StorageError> {
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM change_queue
            WHERE dead_letter = 1 AND (?1 IS NULL OR domain = ?1)
            ORDER BY seq ASC
            "#
        ))
        .bind(domain.map(|d| d.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChangeQueueEntry::try_from).collect()
    }

    /// Return a dead-lettered entry to the live queue with a fresh budget.
    ///
    /// It keeps its original sequence, so it is pushed before anything
    /// queued after it. Returns whether an entry was requeued.
    pub async fn requeue_dead_letter(&self, id: EntryId) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE change_queue
            SET dead_letter = 0, attempts = 0, last_attempt_at = NULL,
                next_attempt_at = NULL, last_error = NULL
            WHERE id = ?1 AND dead_letter = 1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop every live entry. Dead letters are kept for inspection.
    pub async fn clear(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM change_queue WHERE dead_letter = 0")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
