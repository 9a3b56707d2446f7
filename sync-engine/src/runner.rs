//! One sync cycle for one domain.
//!
//! A cycle pulls remote changes and merges them, then pushes queued local
//! changes in FIFO order. The caller proves exclusive access to the domain
//! by handing over its [`DomainPermit`].

use crate::events::EventPublisher;
use crate::permit::DomainPermit;
use crate::storage::{ChangeQueue, FailOutcome, SqliteStorage};
use crate::store::{LocalStore, MergeOutcome};
use crate::transport::{RemoteTransport, TransportError};
use dsync_core::{RetryPolicy, StatusRegistry};
use dsync_types::{
    Direction, Domain, Identity, RemoteChangeEvent, Scope, SyncError, SyncEvent, SyncStatus,
    Timestamp,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Step shown while a push waits for its retry backoff.
pub const STEP_PUSH_DEFERRED: &str = "push deferred (retry backoff)";

/// What a successful cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Domain that was synced.
    pub domain: Domain,
    /// Halves that ran.
    pub direction: Direction,
    /// Remote changes received.
    pub pulled: usize,
    /// Remote changes that altered local state.
    pub applied: usize,
    /// Local changes confirmed by the remote.
    pub pushed: usize,
    /// Whether pushing stopped early because the head entry was backing off.
    pub deferred: bool,
    /// Last-success timestamp stored for the domain.
    pub finished_at: Timestamp,
}

impl CycleReport {
    fn new(domain: Domain, direction: Direction) -> Self {
        Self {
            domain,
            direction,
            pulled: 0,
            applied: 0,
            pushed: 0,
            deferred: false,
            finished_at: Timestamp::default(),
        }
    }

    fn summary(&self) -> String {
        let mut summary = format!("pulled {}, pushed {}", self.pulled, self.pushed);
        if self.deferred {
            summary.push_str(", push deferred");
        }
        summary
    }
}

/// Runs sync cycles against the shared registry, queue and publisher.
#[derive(Clone)]
pub struct DomainSyncRunner {
    registry: Arc<StatusRegistry>,
    queue: ChangeQueue,
    storage: SqliteStorage,
    publisher: Arc<EventPublisher>,
    store: Arc<dyn LocalStore>,
    push_batch_size: usize,
}

impl DomainSyncRunner {
    /// Create a runner.
    pub fn new(
        registry: Arc<StatusRegistry>,
        storage: SqliteStorage,
        publisher: Arc<EventPublisher>,
        store: Arc<dyn LocalStore>,
        retry: RetryPolicy,
        push_batch_size: usize,
    ) -> Self {
        Self {
            registry,
            queue: storage.change_queue(retry),
            storage,
            publisher,
            store,
            push_batch_size: push_batch_size.max(1),
        }
    }

    /// The queue this runner drains.
    pub fn queue(&self) -> &ChangeQueue {
        &self.queue
    }

    /// Run one cycle for the permit's domain.
    ///
    /// On failure the domain is left in `error` with its last-success
    /// timestamp unchanged.
    pub async fn run_cycle(
        &self,
        permit: &DomainPermit,
        transport: &dyn RemoteTransport,
        direction: Direction,
        identity: &Identity,
    ) -> Result<CycleReport, SyncError> {
        let domain = permit.domain();
        self.begin(domain, identity).await;

        match self.run_steps(domain, transport, direction, identity).await {
            Ok(mut report) => {
                let finished = self.finish_ok(domain, identity, report.summary()).await;
                report.finished_at = match finished {
                    Ok(at) => at,
                    Err(err) => {
                        self.finish_err(domain, identity, &err).await;
                        return Err(err);
                    }
                };
                info!(
                    %domain,
                    %direction,
                    pulled = report.pulled,
                    pushed = report.pushed,
                    deferred = report.deferred,
                    "Sync cycle completed"
                );
                Ok(report)
            }
            Err(err) => {
                self.finish_err(domain, identity, &err).await;
                Err(err)
            }
        }
    }

    async fn run_steps(
        &self,
        domain: Domain,
        transport: &dyn RemoteTransport,
        direction: Direction,
        identity: &Identity,
    ) -> Result<CycleReport, SyncError> {
        let mut report = CycleReport::new(domain, direction);

        if direction.pulls() {
            self.step(domain, identity, "pulling remote changes").await;
            let since = self.registry.last_success(domain);
            let changes = transport
                .pull(domain, since)
                .await
                .map_err(|e| SyncError::Network(e.to_string()))?;
            report.pulled = changes.len();

            for change in &changes {
                if change.domain != domain {
                    warn!(%domain, other = %change.domain, record_id = %change.record.id, "Ignoring pulled change for another domain");
                    continue;
                }
                if self.apply_remote(change, identity).await? == MergeOutcome::Applied {
                    report.applied += 1;
                }
            }
            self.step(
                domain,
                identity,
                format!("merged {} of {} remote changes", report.applied, report.pulled),
            )
            .await;
        }

        if direction.pushes() {
            self.step(domain, identity, "pushing local changes").await;
            self.push_queued(domain, transport, identity, &mut report)
                .await?;
            if report.deferred {
                self.step(domain, identity, STEP_PUSH_DEFERRED).await;
            } else {
                self.step(
                    domain,
                    identity,
                    format!("pushed {} local changes", report.pushed),
                )
                .await;
            }
        }

        Ok(report)
    }

    /// Push the head of the domain's queue, stopping at the first failure.
    ///
    /// An unreachable remote aborts with `Network` and leaves the entry's
    /// retry budget untouched. Only a refusal counts as a failed attempt.
    async fn push_queued(
        &self,
        domain: Domain,
        transport: &dyn RemoteTransport,
        identity: &Identity,
        report: &mut CycleReport,
    ) -> Result<(), SyncError> {
        let entries = self
            .queue
            .drain_limit(domain, Some(self.push_batch_size))
            .await?;
        let now = Timestamp::now();

        for entry in entries {
            if !entry.is_due(now) {
                debug!(%domain, entry_id = %entry.id, attempts = entry.attempts, "Head entry still backing off");
                report.deferred = true;
                break;
            }

            match transport.push(&entry).await {
                Ok(()) => {
                    self.queue.ack(entry.id).await?;
                    report.pushed += 1;
                }
                Err(e @ (TransportError::Unreachable(_) | TransportError::Timeout)) => {
                    warn!(%domain, entry_id = %entry.id, error = %e, "Remote unreachable, push postponed");
                    return Err(SyncError::Network(e.to_string()));
                }
                Err(e) => {
                    let reason = e.to_string();
                    let outcome = self.queue.fail(entry.id, &reason).await?;
                    let dead_lettered = matches!(outcome, FailOutcome::DeadLettered { .. });

                    if dead_lettered {
                        error!(%domain, entry_id = %entry.id, %reason, "Entry exhausted its retry budget, dead-lettered");
                        self.publisher
                            .publish(SyncEvent::DeadLettered {
                                domain,
                                identity: identity.clone(),
                                entry_id: entry.id,
                                error: reason.clone(),
                            })
                            .await;
                    } else {
                        warn!(%domain, entry_id = %entry.id, ?outcome, %reason, "Push failed");
                    }

                    return Err(SyncError::PushFailed {
                        entry_id: entry.id,
                        reason,
                        dead_lettered,
                    });
                }
            }
        }
        Ok(())
    }

    /// Merge one remote change and announce it if local state changed.
    pub(crate) async fn apply_remote(
        &self,
        change: &RemoteChangeEvent,
        identity: &Identity,
    ) -> Result<MergeOutcome, SyncError> {
        let outcome = self
            .store
            .apply(change)
            .await
            .map_err(|e| e.into_sync_error(change.domain))?;

        match outcome {
            MergeOutcome::Applied => {
                self.publisher
                    .publish(SyncEvent::RealtimeChanged {
                        domain: change.domain,
                        record: change.record.clone(),
                        change_type: change.change_type,
                        identity: identity.clone(),
                    })
                    .await;
            }
            MergeOutcome::Unchanged => {
                debug!(domain = %change.domain, record_id = %change.record.id, "Remote change already applied");
            }
        }
        Ok(outcome)
    }

    pub(crate) async fn begin(&self, domain: Domain, identity: &Identity) {
        info!(%domain, "Sync cycle started");
        self.registry
            .set(domain, SyncStatus::Syncing, Some("starting".to_string()));
        self.publisher
            .publish(SyncEvent::Started {
                scope: Scope::Domain(domain),
                identity: identity.clone(),
            })
            .await;
    }

    pub(crate) async fn step(&self, domain: Domain, identity: &Identity, step: impl Into<String>) {
        let step = step.into();
        debug!(%domain, %step, "Sync step");
        self.registry
            .set(domain, SyncStatus::Syncing, Some(step.clone()));

        let queue_size = match self.queue.size(Some(domain)).await {
            Ok(size) => size,
            Err(e) => {
                warn!(%domain, error = %e, "Could not read queue size");
                0
            }
        };
        self.publisher
            .publish(SyncEvent::StatusUpdate {
                scope: Scope::Domain(domain),
                identity: identity.clone(),
                status: SyncStatus::Syncing,
                step,
                queue_size,
            })
            .await;
    }

    /// Persist the last-success timestamp, then mark the domain idle.
    ///
    /// If the timestamp cannot be persisted the domain is left untouched
    /// and the error is returned.
    pub(crate) async fn finish_ok(
        &self,
        domain: Domain,
        identity: &Identity,
        step: String,
    ) -> Result<Timestamp, SyncError> {
        let at = Timestamp::now();
        self.storage.save_timestamp(domain.into(), at).await?;
        let stored = self.registry.mark_success(domain, at);
        self.registry.set(domain, SyncStatus::Idle, Some(step));
        self.publisher
            .publish(SyncEvent::Completed {
                scope: Scope::Domain(domain),
                identity: identity.clone(),
            })
            .await;
        Ok(stored)
    }

    pub(crate) async fn finish_err(&self, domain: Domain, identity: &Identity, err: &SyncError) {
        warn!(%domain, error = %err, "Sync cycle failed");
        self.registry
            .set(domain, SyncStatus::Error, Some(err.to_string()));
        self.publisher
            .publish(SyncEvent::Error {
                scope: Scope::Domain(domain),
                identity: identity.clone(),
                error: err.to_string(),
            })
            .await;
    }

    pub(crate) fn registry(&self) -> &Arc<StatusRegistry> {
        &self.registry
    }

    pub(crate) fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub(crate) fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }
}
