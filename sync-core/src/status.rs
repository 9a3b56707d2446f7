//! Per-scope status table.
//!
//! The registry is the single owner of every scope's [`SyncState`]. It is
//! passed around by handle (`Arc<StatusRegistry>`) instead of living in a
//! global, so each test can start from a fresh one.
//!
//! Writers for different domains may run concurrently; the map shards
//! internally so they never contend on one lock. Writers for the same
//! domain are serialized one level up, by the orchestrator's per-domain
//! permit.

use dashmap::DashMap;
use dsync_types::{Scope, SyncState, SyncStatus, Timestamp};

/// In-memory table of status and last-success timestamp per scope.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    states: DashMap<Scope, SyncState>,
}

impl StatusRegistry {
    /// Create an empty registry. Every scope reads as `Unknown`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a scope.
    ///
    /// Never fails: a scope that was never written reads as `Unknown`.
    pub fn get(&self, scope: impl Into<Scope>) -> SyncState {
        let scope = scope.into();
        self.states
            .get(&scope)
            .map(|s| s.value().clone())
            .unwrap_or_else(|| SyncState::unknown(scope))
    }

    /// Current status of a scope.
    pub fn status(&self, scope: impl Into<Scope>) -> SyncStatus {
        let scope = scope.into();
        self.states
            .get(&scope)
            .map(|s| s.status)
            .unwrap_or_default()
    }

    /// Current human-readable step of a scope.
    pub fn step(&self, scope: impl Into<Scope>) -> Option<String> {
        let scope = scope.into();
        self.states
            .get(&scope)
            .and_then(|s| s.current_step.clone())
    }

    /// When the scope last finished a successful cycle.
    pub fn last_success(&self, scope: impl Into<Scope>) -> Option<Timestamp> {
        let scope = scope.into();
        self.states.get(&scope).and_then(|s| s.last_success)
    }

    /// Set the status and step of a scope.
    ///
    /// The last-success timestamp is left untouched.
    pub fn set(&self, scope: impl Into<Scope>, status: SyncStatus, step: Option<String>) {
        let scope = scope.into();
        let mut entry = self
            .states
            .entry(scope)
            .or_insert_with(|| SyncState::unknown(scope));
        entry.status = status;
        entry.current_step = step;
    }

    /// Record a successful cycle finishing at `at`.
    ///
    /// Timestamps never move backwards: an `at` older than the stored value
    /// is ignored. Returns the timestamp now stored.
    pub fn mark_success(&self, scope: impl Into<Scope>, at: Timestamp) -> Timestamp {
        let scope = scope.into();
        let mut entry = self
            .states
            .entry(scope)
            .or_insert_with(|| SyncState::unknown(scope));
        let next = match entry.last_success {
            Some(existing) if existing >= at => existing,
            _ => at,
        };
        entry.last_success = Some(next);
        next
    }

    /// All known states, ordered by scope.
    pub fn snapshot(&self) -> Vec<SyncState> {
        let mut states: Vec<SyncState> = self.states.iter().map(|s| s.value().clone()).collect();
        states.sort_by_key(|s| s.scope);
        states
    }

    /// Forget every scope.
    pub fn clear(&self) {
        self.states.clear();
    }
}
