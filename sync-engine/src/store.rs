//! Local store seam.
//!
//! The engine hands every remote change to a [`LocalStore`] and never looks
//! inside the payload. Applying the same change twice must leave the store
//! as if it had been applied once.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dsync_types::{ChangeType, Domain, Record, RemoteChangeEvent, SyncError};
use thiserror::Error;

/// What applying a change did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Local state changed.
    Applied,
    /// Local state already reflected the change (duplicate or stale).
    Unchanged,
}

/// Local store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Local and remote diverged in a way the store will not resolve.
    #[error("conflict on record {record_id}: {reason}")]
    Conflict {
        /// The record in conflict.
        record_id: String,
        /// Why the change could not be merged.
        reason: String,
    },

    /// The store could not be written.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Convert into the engine taxonomy for `domain`.
    pub fn into_sync_error(self, domain: Domain) -> SyncError {
        match self {
            StoreError::Conflict { record_id, reason } => SyncError::MergeConflict {
                domain,
                record_id,
                reason,
            },
            StoreError::Unavailable(reason) => SyncError::Storage(reason),
        }
    }
}

/// Applies merged remote records to local state.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Merge one remote change. Must be idempotent.
    async fn apply(&self, change: &RemoteChangeEvent) -> Result<MergeOutcome, StoreError>;
}

/// In-memory local store keyed by `(domain, record id)`.
///
/// Versioned records merge by version: older versions are ignored, and the
/// same version with different data is a conflict.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<(Domain, String), Record>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current copy of a record.
    pub fn get(&self, domain: Domain, id: &str) -> Option<Record> {
        self.records
            .get(&(domain, id.to_string()))
            .map(|r| r.value().clone())
    }

    /// Number of records held for a domain.
    pub fn len(&self, domain: Domain) -> usize {
        self.records.iter().filter(|r| r.key().0 == domain).count()
    }

    /// Whether the store holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records of a domain, ordered by id.
    pub fn records(&self, domain: Domain) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .records
            .iter()
            .filter(|r| r.key().0 == domain)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

fn is_stale(existing: &Record, incoming: &Record) -> bool {
    matches!((existing.version, incoming.version), (Some(have), Some(got)) if got < have)
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn apply(&self, change: &RemoteChangeEvent) -> Result<MergeOutcome, StoreError> {
        let key = (change.domain, change.record.id.clone());
        let incoming = &change.record;

        match change.change_type {
            ChangeType::Delete => {
                let removed = self
                    .records
                    .remove_if(&key, |_, existing| !is_stale(existing, incoming));
                Ok(if removed.is_some() {
                    MergeOutcome::Applied
                } else {
                    MergeOutcome::Unchanged
                })
            }
            ChangeType::Insert | ChangeType::Update => {
                let mut slot = match self.records.entry(key) {
                    Entry::Vacant(vacant) => {
                        vacant.insert(incoming.clone());
                        return Ok(MergeOutcome::Applied);
                    }
                    Entry::Occupied(occupied) => occupied,
                };
                let existing = slot.get_mut();

                if existing == incoming || is_stale(existing, incoming) {
                    return Ok(MergeOutcome::Unchanged);
                }
                if existing.version.is_some()
                    && existing.version == incoming.version
                    && existing.data != incoming.data
                {
                    return Err(StoreError::Conflict {
                        record_id: incoming.id.clone(),
                        reason: format!(
                            "version {} already holds different data",
                            incoming.version.unwrap_or_default()
                        ),
                    });
                }

                *existing = incoming.clone();
                Ok(MergeOutcome::Applied)
            }
        }
    }
}
