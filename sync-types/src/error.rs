//! Error types for the sync engine.

use thiserror::Error;

use crate::domain::{Domain, Scope};
use crate::ids::EntryId;

/// Errors that can occur in sync operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No caller identity was supplied for a mutating operation.
    #[error("missing identity: a caller identity is required")]
    MissingIdentity,

    /// The scope already has a cycle in flight.
    #[error("sync already in progress for {scope}")]
    SyncInProgress {
        /// Scope that is busy.
        scope: Scope,
    },

    /// The remote could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The remote rejected a queued entry.
    #[error("push of entry {entry_id} failed: {reason}")]
    PushFailed {
        /// The rejected entry.
        entry_id: EntryId,
        /// Transport detail.
        reason: String,
        /// Whether the entry exhausted its retry budget.
        dead_lettered: bool,
    },

    /// Remote and local versions of a record diverge.
    #[error("merge conflict in {domain} record {record_id}: {reason}")]
    MergeConflict {
        /// Domain of the record.
        domain: Domain,
        /// Conflicting record.
        record_id: String,
        /// Store detail.
        reason: String,
    },

    /// The caller named a domain that is not registered.
    #[error("unknown domain: {0}")]
    UnknownDomain(String),

    /// Durable storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Storage(_) => true,
            SyncError::PushFailed { dead_lettered, .. } => !dead_lettered,
            _ => false,
        }
    }
}
