//! Per-domain mutual exclusion.
//!
//! A [`DomainPermit`] is the only way to run a sync cycle. Acquisition never
//! waits: a domain that is already held is reported as in progress, and the
//! permit is released when it is dropped, on every exit path.

use dsync_types::{Domain, Scope, SyncError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Proof that the holder is the only cycle running for a domain.
#[derive(Debug)]
pub struct DomainPermit {
    domain: Domain,
    _guard: OwnedMutexGuard<()>,
}

impl DomainPermit {
    /// The domain this permit covers.
    pub fn domain(&self) -> Domain {
        self.domain
    }
}

/// One lock per domain.
#[derive(Debug)]
pub struct DomainLocks {
    locks: HashMap<Domain, Arc<Mutex<()>>>,
}

impl DomainLocks {
    /// A lock for every domain.
    pub fn new() -> Self {
        Self {
            locks: Domain::ALL
                .iter()
                .map(|d| (*d, Arc::new(Mutex::new(()))))
                .collect(),
        }
    }

    /// Take the permit for `domain` if nobody holds it.
    pub fn try_acquire(&self, domain: Domain) -> Result<DomainPermit, SyncError> {
        let lock = self
            .locks
            .get(&domain)
            .ok_or_else(|| SyncError::UnknownDomain(domain.to_string()))?;
        let guard = Arc::clone(lock)
            .try_lock_owned()
            .map_err(|_| SyncError::SyncInProgress {
                scope: Scope::Domain(domain),
            })?;
        Ok(DomainPermit {
            domain,
            _guard: guard,
        })
    }

    /// Take every permit, or none.
    pub fn try_acquire_all(&self) -> Result<Vec<DomainPermit>, SyncError> {
        Domain::ALL.iter().map(|d| self.try_acquire(*d)).collect()
    }

    /// Whether a cycle currently holds `domain`.
    pub fn is_held(&self, domain: Domain) -> bool {
        self.locks
            .get(&domain)
            .map_or(false, |lock| lock.try_lock().is_err())
    }
}

impl Default for DomainLocks {
    fn default() -> Self {
        Self::new()
    }
}
