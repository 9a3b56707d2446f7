//! Lifecycle events published to observers.
//!
//! Events are the only engine state exposed to the UI layer besides the
//! status reads. Each event has a topic string matching the names used by
//! the application's event bus.

use serde::{Deserialize, Serialize};

use crate::change::{ChangeType, Record};
use crate::domain::{Domain, Scope, SyncStatus};
use crate::ids::{EntryId, Identity};

/// Topic of [`SyncEvent::Started`].
pub const TOPIC_SYNC_STARTED: &str = "sync_started";
/// Topic of [`SyncEvent::StatusUpdate`].
pub const TOPIC_SYNC_STATUS_UPDATE: &str = "sync_status_update";
/// Topic of [`SyncEvent::Completed`].
pub const TOPIC_SYNC_COMPLETED: &str = "sync_completed";
/// Topic of [`SyncEvent::Error`].
pub const TOPIC_SYNC_ERROR: &str = "sync_error";
/// Topic of [`SyncEvent::DeadLettered`].
pub const TOPIC_SYNC_DEAD_LETTER: &str = "sync_dead_letter";

/// An event published by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A cycle (or sweep, for `System`) started.
    Started {
        /// Scope that started syncing.
        scope: Scope,
        /// Who triggered it.
        identity: Identity,
    },
    /// Progress inside a running cycle.
    StatusUpdate {
        /// Scope the update is about.
        scope: Scope,
        /// Who triggered the cycle.
        identity: Identity,
        /// Status at the time of the update.
        status: SyncStatus,
        /// Human-readable step.
        step: String,
        /// Queued local changes for the scope (all domains for `System`).
        queue_size: usize,
    },
    /// A cycle finished successfully.
    Completed {
        /// Scope that finished.
        scope: Scope,
        /// Who triggered it.
        identity: Identity,
    },
    /// A cycle failed.
    Error {
        /// Scope that failed.
        scope: Scope,
        /// Who triggered it.
        identity: Identity,
        /// Failure detail.
        error: String,
    },
    /// A remote change was merged locally.
    RealtimeChanged {
        /// Domain of the changed record.
        domain: Domain,
        /// The merged record.
        record: Record,
        /// What happened remotely.
        change_type: ChangeType,
        /// Identity the change was applied for.
        identity: Identity,
    },
    /// A queued change exhausted its retry budget.
    DeadLettered {
        /// Domain of the entry.
        domain: Domain,
        /// Identity of the cycle that gave up.
        identity: Identity,
        /// The dead-lettered entry.
        entry_id: EntryId,
        /// Last push error.
        error: String,
    },
}

impl SyncEvent {
    /// Topic name used for subscription filtering.
    pub fn topic(&self) -> String {
        match self {
            SyncEvent::Started { .. } => TOPIC_SYNC_STARTED.to_string(),
            SyncEvent::StatusUpdate { .. } => TOPIC_SYNC_STATUS_UPDATE.to_string(),
            SyncEvent::Completed { .. } => TOPIC_SYNC_COMPLETED.to_string(),
            SyncEvent::Error { .. } => TOPIC_SYNC_ERROR.to_string(),
            SyncEvent::RealtimeChanged { domain, .. } => realtime_topic(*domain),
            SyncEvent::DeadLettered { .. } => TOPIC_SYNC_DEAD_LETTER.to_string(),
        }
    }

    /// Scope the event is about.
    pub fn scope(&self) -> Scope {
        match self {
            SyncEvent::Started { scope, .. }
            | SyncEvent::StatusUpdate { scope, .. }
            | SyncEvent::Completed { scope, .. }
            | SyncEvent::Error { scope, .. } => *scope,
            SyncEvent::RealtimeChanged { domain, .. } | SyncEvent::DeadLettered { domain, .. } => {
                Scope::Domain(*domain)
            }
        }
    }
}

/// Topic carrying realtime changes for one domain, e.g. `goals_realtime_changed`.
pub fn realtime_topic(domain: Domain) -> String {
    format!("{}_realtime_changed", domain.as_str())
}
