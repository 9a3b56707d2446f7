//! # sync-types
//!
//! Shared data types for the domain sync engine.
//!
//! This crate provides the foundational types used across all sync crates:
//! - [`Domain`], [`Scope`] - What is synchronized, and the aggregate `system` scope
//! - [`SyncStatus`], [`SyncState`] - Per-scope status bookkeeping
//! - [`ChangeQueueEntry`], [`RemoteChangeEvent`] - Outgoing and incoming changes
//! - [`SyncEvent`] - Lifecycle events published to observers
//! - [`SweepResult`] - Aggregated result of a full sweep
//! - [`SyncError`] - Error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

mod change;
mod domain;
mod error;
mod event;
mod ids;
mod sweep;

pub use change::{ChangeOperation, ChangeQueueEntry, ChangeType, Record, RemoteChangeEvent};
pub use domain::{Direction, Domain, Scope, SyncState, SyncStatus};
pub use error::SyncError;
pub use event::{
    realtime_topic, SyncEvent, TOPIC_SYNC_COMPLETED, TOPIC_SYNC_DEAD_LETTER, TOPIC_SYNC_ERROR,
    TOPIC_SYNC_STARTED, TOPIC_SYNC_STATUS_UPDATE,
};
pub use ids::{EntryId, Identity, Timestamp};
pub use sweep::{DomainOutcome, SweepResult};
