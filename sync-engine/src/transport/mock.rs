//! Mock transport for testing.
//!
//! Allows queueing pull batches, forcing failures and capturing pushed
//! entries for verification.

use super::{RemoteTransport, TransportError};
use async_trait::async_trait;
use dsync_types::{ChangeQueueEntry, Domain, EntryId, RemoteChangeEvent, Timestamp};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Mock transport for testing.
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    pull_batches: HashMap<Domain, VecDeque<Vec<RemoteChangeEvent>>>,
    pushed: Vec<ChangeQueueEntry>,
    pull_calls: Vec<(Domain, Option<Timestamp>)>,
    push_calls: usize,
    unreachable: Option<String>,
    fail_next_pull: Option<String>,
    fail_next_push: Option<String>,
    rejected: HashSet<EntryId>,
    delay: Option<Duration>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a batch to be returned by the next `pull()` for `domain`.
    pub fn queue_pull(&self, domain: Domain, events: Vec<RemoteChangeEvent>) {
        self.inner()
            .pull_batches
            .entry(domain)
            .or_default()
            .push_back(events);
    }

    /// Fail every call until [`set_reachable`](Self::set_reachable).
    pub fn set_unreachable(&self, reason: &str) {
        self.inner().unreachable = Some(reason.to_string());
    }

    /// Undo [`set_unreachable`](Self::set_unreachable).
    pub fn set_reachable(&self) {
        self.inner().unreachable = None;
    }

    /// Cause the next pull() to fail with the given error.
    pub fn fail_next_pull(&self, error: &str) {
        self.inner().fail_next_pull = Some(error.to_string());
    }

    /// Cause the next push() to be rejected with the given error.
    pub fn fail_next_push(&self, error: &str) {
        self.inner().fail_next_push = Some(error.to_string());
    }

    /// Reject every push of `id` until [`accept`](Self::accept).
    pub fn reject(&self, id: EntryId) {
        self.inner().rejected.insert(id);
    }

    /// Stop rejecting `id`.
    pub fn accept(&self, id: EntryId) {
        self.inner().rejected.remove(&id);
    }

    /// Make every call wait before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.inner().delay = Some(delay);
    }

    /// Entries accepted so far, in push order.
    pub fn pushed(&self) -> Vec<ChangeQueueEntry> {
        self.inner().pushed.clone()
    }

    /// Ids of the entries accepted so far, in push order.
    pub fn pushed_ids(&self) -> Vec<EntryId> {
        self.inner().pushed.iter().map(|e| e.id).collect()
    }

    /// Every pull() call so far with its `since` argument.
    pub fn pull_calls(&self) -> Vec<(Domain, Option<Timestamp>)> {
        self.inner().pull_calls.clone()
    }

    /// Number of push() calls so far, accepted or not.
    pub fn push_calls(&self) -> usize {
        self.inner().push_calls
    }

    /// Clear all state.
    pub fn reset(&self) {
        *self.inner() = MockTransportInner::default();
    }

    async fn wait(&self) {
        let delay = self.inner().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn pull(
        &self,
        domain: Domain,
        since: Option<Timestamp>,
    ) -> Result<Vec<RemoteChangeEvent>, TransportError> {
        self.wait().await;
        let mut inner = self.inner();
        inner.pull_calls.push((domain, since));

        if let Some(reason) = &inner.unreachable {
            return Err(TransportError::Unreachable(reason.clone()));
        }
        // Check for forced failure
        if let Some(error) = inner.fail_next_pull.take() {
            return Err(TransportError::Unreachable(error));
        }

        Ok(inner
            .pull_batches
            .get_mut(&domain)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default())
    }

    async fn push(&self, entry: &ChangeQueueEntry) -> Result<(), TransportError> {
        self.wait().await;
        let mut inner = self.inner();
        inner.push_calls += 1;

        if let Some(reason) = &inner.unreachable {
            return Err(TransportError::Unreachable(reason.clone()));
        }
        if let Some(error) = inner.fail_next_push.take() {
            return Err(TransportError::Rejected(error));
        }
        if inner.rejected.contains(&entry.id) {
            return Err(TransportError::Rejected(format!("entry {} refused", entry.id)));
        }

        inner.pushed.push(entry.clone());
        Ok(())
    }
}
