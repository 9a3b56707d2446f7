//! Result of a full sweep over all domains.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Domain, SyncStatus};
use crate::ids::Timestamp;

/// Outcome of one domain inside a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DomainOutcome {
    /// The domain cycle succeeded.
    Ok,
    /// The domain cycle failed.
    Error {
        /// Failure detail.
        detail: String,
    },
}

impl DomainOutcome {
    /// Whether the domain cycle succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, DomainOutcome::Ok)
    }
}

/// Aggregated result of `sync_all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepResult {
    /// When the sweep started.
    pub started_at: Timestamp,
    /// When the last domain finished.
    pub finished_at: Timestamp,
    /// Per-domain outcomes, keyed in canonical domain order.
    pub per_domain: BTreeMap<Domain, DomainOutcome>,
    /// `Error` if any domain failed or the sweep could not be recorded, `Idle` otherwise.
    pub overall: SyncStatus,
}

impl SweepResult {
    /// Build a result from per-domain outcomes, deriving `overall`.
    pub fn from_outcomes(
        started_at: Timestamp,
        finished_at: Timestamp,
        per_domain: BTreeMap<Domain, DomainOutcome>,
    ) -> Self {
        let overall = if per_domain.values().all(DomainOutcome::is_ok) {
            SyncStatus::Idle
        } else {
            SyncStatus::Error
        };
        Self {
            started_at,
            finished_at,
            per_domain,
            overall,
        }
    }

    /// Whether every domain succeeded.
    pub fn is_ok(&self) -> bool {
        self.overall == SyncStatus::Idle
    }

    /// Domains that failed, in canonical order.
    pub fn failed_domains(&self) -> Vec<Domain> {
        self.per_domain
            .iter()
            .filter(|(_, outcome)| !outcome.is_ok())
            .map(|(domain, _)| *domain)
            .collect()
    }
}
