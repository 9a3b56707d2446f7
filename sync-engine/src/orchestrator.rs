//! The engine facade.
//!
//! [`SyncOrchestrator`] owns the shared state (status registry, durable
//! queue, event publisher, per-domain locks) and sequences cycles. It is
//! cheap to clone; clones share everything.

use crate::audit::KnowledgeSink;
use crate::config::EngineConfig;
use crate::events::{EventPublisher, Subscription};
use crate::permit::{DomainLocks, DomainPermit};
use crate::runner::{CycleReport, DomainSyncRunner};
use crate::storage::{ChangeQueue, SqliteStorage};
use crate::store::{LocalStore, MemoryStore, MergeOutcome};
use crate::transport::RemoteTransport;
use dsync_core::StatusRegistry;
use dsync_types::{
    ChangeOperation, ChangeType, Direction, Domain, DomainOutcome, EntryId, Identity, Record,
    RemoteChangeEvent, Scope, SweepResult, SyncError, SyncEvent, SyncState, SyncStatus,
    Timestamp,
};
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to a cycle started by [`SyncOrchestrator::trigger_domain_sync`].
///
/// Dropping it detaches the cycle; it still runs to completion.
#[derive(Debug)]
pub struct SyncHandle {
    domain: Domain,
    handle: JoinHandle<Result<CycleReport, SyncError>>,
}

impl SyncHandle {
    /// Domain being synced.
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Wait for the cycle to finish.
    pub async fn wait(self) -> Result<CycleReport, SyncError> {
        self.handle
            .await
            .map_err(|e| SyncError::Internal(format!("sync task for {} failed: {e}", self.domain)))?
    }
}

pub(crate) struct Inner {
    pub(crate) config: EngineConfig,
    pub(crate) runner: DomainSyncRunner,
    pub(crate) transports: HashMap<Domain, Arc<dyn RemoteTransport>>,
    pub(crate) audit: Option<Arc<dyn KnowledgeSink>>,
    pub(crate) locks: DomainLocks,
    sweep: Arc<Mutex<()>>,
}

/// Builder for [`SyncOrchestrator`].
pub struct SyncOrchestratorBuilder {
    config: EngineConfig,
    storage: Option<SqliteStorage>,
    store: Option<Arc<dyn LocalStore>>,
    audit: Option<Arc<dyn KnowledgeSink>>,
    transports: HashMap<Domain, Arc<dyn RemoteTransport>>,
}

impl SyncOrchestratorBuilder {
    /// Use an already opened storage instead of `config.storage.database`.
    pub fn storage(mut self, storage: SqliteStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Where merged remote records go. Defaults to a [`MemoryStore`].
    pub fn local_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Where specialized flows write their audit records.
    pub fn audit_sink(mut self, sink: Arc<dyn KnowledgeSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Bind a transport to a domain. Unbound domains are rejected.
    pub fn transport(mut self, domain: Domain, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transports.insert(domain, transport);
        self
    }

    /// Bind one transport to every domain.
    pub fn transport_for_all(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        for domain in Domain::ALL {
            self.transports.insert(domain, Arc::clone(&transport));
        }
        self
    }

    /// Open storage and restore persisted last-success timestamps.
    pub async fn open(self) -> Result<SyncOrchestrator, SyncError> {
        self.config
            .validate()
            .map_err(|e| SyncError::Internal(e.to_string()))?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => SqliteStorage::open(&self.config.storage.database).await?,
        };

        let registry = Arc::new(StatusRegistry::new());
        for (scope, at) in storage.load_timestamps().await? {
            registry.mark_success(scope, at);
        }

        let publisher = Arc::new(EventPublisher::new(
            self.config.subscriber_timeout(),
            self.config.events.channel_capacity,
        ));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn LocalStore>);
        let runner = DomainSyncRunner::new(
            registry,
            storage,
            publisher,
            store,
            self.config.retry_policy(),
            self.config.queue.push_batch_size,
        );

        info!(
            domains = self.transports.len(),
            queued = runner.queue().size(None).await?,
            "Sync engine opened"
        );

        Ok(SyncOrchestrator {
            inner: Arc::new(Inner {
                config: self.config,
                runner,
                transports: self.transports,
                audit: self.audit,
                locks: DomainLocks::new(),
                sweep: Arc::new(Mutex::new(())),
            }),
        })
    }
}

/// Entry point for triggering syncs and reading sync state.
#[derive(Clone)]
pub struct SyncOrchestrator {
    pub(crate) inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// Start building an orchestrator.
    pub fn builder(config: EngineConfig) -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder {
            config,
            storage: None,
            store: None,
            audit: None,
            transports: HashMap::new(),
        }
    }

    fn transport(&self, domain: Domain) -> Result<Arc<dyn RemoteTransport>, SyncError> {
        self.inner
            .transports
            .get(&domain)
            .cloned()
            .ok_or_else(|| SyncError::UnknownDomain(domain.to_string()))
    }

    pub(crate) fn acquire(&self, domain: Domain) -> Result<DomainPermit, SyncError> {
        self.inner.locks.try_acquire(domain).inspect_err(|_| {
            warn!(%domain, "Sync rejected: domain already syncing");
        })
    }

    /// Start a cycle in the background.
    ///
    /// The permit is taken before this returns, so a second trigger for the
    /// same domain fails with `SyncInProgress` until the first cycle ends.
    /// Must be called from within a Tokio runtime.
    pub fn trigger_domain_sync(
        &self,
        domain: Domain,
        direction: Direction,
        identity: &Identity,
    ) -> Result<SyncHandle, SyncError> {
        let transport = self.transport(domain)?;
        let permit = self.acquire(domain)?;
        let this = self.clone();
        let identity = identity.clone();

        let handle = tokio::spawn(async move {
            this.inner
                .runner
                .run_cycle(&permit, transport.as_ref(), direction, &identity)
                .await
        });
        Ok(SyncHandle { domain, handle })
    }

    /// Run a cycle and wait for it.
    pub async fn sync_domain(
        &self,
        domain: Domain,
        direction: Direction,
        identity: &Identity,
    ) -> Result<CycleReport, SyncError> {
        let transport = self.transport(domain)?;
        let permit = self.acquire(domain)?;
        self.inner
            .runner
            .run_cycle(&permit, transport.as_ref(), direction, identity)
            .await
    }

    /// Domains a sweep visits, in order.
    pub fn sweep_order(&self) -> Vec<Domain> {
        match &self.inner.config.sweep.domains {
            Some(domains) => domains.clone(),
            None => Domain::ALL
                .iter()
                .copied()
                .filter(|d| self.inner.transports.contains_key(d))
                .collect(),
        }
    }

    /// Sync every domain and aggregate the outcome.
    ///
    /// A failing domain never stops the sweep. The only error is
    /// `SyncInProgress` for the system scope, when another sweep runs.
    pub async fn sync_all(&self, identity: &Identity) -> Result<SweepResult, SyncError> {
        let _sweep = Arc::clone(&self.inner.sweep)
            .try_lock_owned()
            .map_err(|_| {
                warn!("Full sync rejected: a sweep is already running");
                SyncError::SyncInProgress {
                    scope: Scope::System,
                }
            })?;

        let order = self.sweep_order();
        let started_at = Timestamp::now();
        info!(domains = order.len(), parallel = self.inner.config.sweep.parallel, "Full sync started");
        self.set_system(SyncStatus::Syncing, "starting full sync");
        self.publish(SyncEvent::Started {
            scope: Scope::System,
            identity: identity.clone(),
        })
        .await;

        let outcomes: Vec<(Domain, Result<CycleReport, SyncError>)> =
            if self.inner.config.sweep.parallel {
                self.system_step(identity, format!("syncing {} domains", order.len()))
                    .await;
                join_all(order.iter().map(|domain| async move {
                    (
                        *domain,
                        self.sync_domain(*domain, Direction::Bidirectional, identity)
                            .await,
                    )
                }))
                .await
            } else {
                let mut outcomes = Vec::with_capacity(order.len());
                for (i, domain) in order.iter().enumerate() {
                    self.system_step(
                        identity,
                        format!("syncing {domain} ({}/{})", i + 1, order.len()),
                    )
                    .await;
                    let result = self
                        .sync_domain(*domain, Direction::Bidirectional, identity)
                        .await;
                    outcomes.push((*domain, result));
                }
                outcomes
            };

        let per_domain: BTreeMap<Domain, DomainOutcome> = outcomes
            .into_iter()
            .map(|(domain, result)| {
                let outcome = match result {
                    Ok(_) => DomainOutcome::Ok,
                    Err(e) => DomainOutcome::Error {
                        detail: e.to_string(),
                    },
                };
                (domain, outcome)
            })
            .collect();

        let finished_at = Timestamp::now();
        let mut result = SweepResult::from_outcomes(started_at, finished_at, per_domain);
        let runner = &self.inner.runner;

        let failure = if result.is_ok() {
            match runner.storage().save_timestamp(Scope::System, finished_at).await {
                Ok(()) => None,
                Err(e) => {
                    result.overall = SyncStatus::Error;
                    Some(format!("could not persist system timestamp: {e}"))
                }
            }
        } else {
            let failed_domains = result.failed_domains();
            let failed: Vec<&str> = failed_domains.iter().map(Domain::as_str).collect();
            Some(format!(
                "{} of {} domains failed: {}",
                failed.len(),
                result.per_domain.len(),
                failed.join(", ")
            ))
        };

        match failure {
            None => {
                runner.registry().mark_success(Scope::System, finished_at);
                self.set_system(SyncStatus::Idle, "full sync complete");
                info!(domains = result.per_domain.len(), "Full sync completed");
                self.publish(SyncEvent::Completed {
                    scope: Scope::System,
                    identity: identity.clone(),
                })
                .await;
            }
            Some(error) => {
                warn!(%error, "Full sync finished with failures");
                self.set_system(SyncStatus::Error, &error);
                self.publish(SyncEvent::Error {
                    scope: Scope::System,
                    identity: identity.clone(),
                    error,
                })
                .await;
            }
        }

        Ok(result)
    }

    /// Merge a change pushed by the remote outside a cycle.
    ///
    /// Delivering the same change twice leaves local state as delivering it
    /// once; the realtime event is only published when state changed.
    pub async fn handle_remote_change(
        &self,
        domain: Domain,
        record: Record,
        change_type: ChangeType,
        identity: &Identity,
    ) -> Result<MergeOutcome, SyncError> {
        self.transport(domain)?;
        let change = RemoteChangeEvent::new(domain, change_type, record);
        self.inner.runner.apply_remote(&change, identity).await
    }

    /// Queue a local change for pushing.
    ///
    /// With `policy.sync_on_write`, an `up` cycle is started right away
    /// unless one is already running for the domain.
    pub async fn handle_local_change(
        &self,
        domain: Domain,
        operation: ChangeOperation,
        payload: serde_json::Value,
        identity: &Identity,
    ) -> Result<EntryId, SyncError> {
        self.transport(domain)?;
        let id = self.queue().enqueue(domain, operation, &payload).await?;
        debug!(%domain, entry_id = %id, identity = %identity, "Local change queued");

        if self.inner.config.policy.sync_on_write {
            match self.trigger_domain_sync(domain, Direction::Up, identity) {
                Ok(_detached) => {}
                Err(SyncError::SyncInProgress { .. }) => {
                    debug!(%domain, "Change will go out with the running cycle or the next one");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(id)
    }

    /// Current status of a domain or the system scope.
    pub fn get_status(&self, scope: impl Into<Scope>) -> SyncStatus {
        self.inner.runner.registry().status(scope)
    }

    /// When a domain or the system scope last synced successfully.
    pub fn get_last_sync_timestamp(&self, scope: impl Into<Scope>) -> Option<Timestamp> {
        self.inner.runner.registry().last_success(scope)
    }

    /// Current human-readable step of a domain or the system scope.
    pub fn get_step(&self, scope: impl Into<Scope>) -> Option<String> {
        self.inner.runner.registry().step(scope)
    }

    /// Full state of a scope.
    pub fn get_state(&self, scope: impl Into<Scope>) -> SyncState {
        self.inner.runner.registry().get(scope)
    }

    /// Every scope seen so far, ordered.
    pub fn states(&self) -> Vec<SyncState> {
        self.inner.runner.registry().snapshot()
    }

    /// The durable change queue.
    pub fn queue(&self) -> &ChangeQueue {
        self.inner.runner.queue()
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        self.inner.runner.publisher().subscribe()
    }

    /// Receive events of one topic published from now on.
    pub fn subscribe_topic(&self, topic: impl Into<String>) -> Subscription {
        self.inner.runner.publisher().subscribe_topic(topic)
    }

    /// Forget all sync state for the session.
    ///
    /// Clears the live queue and every timestamp; every scope reads
    /// `unknown` afterwards. Dead letters are kept. Rejected while any
    /// domain or a sweep is running.
    pub async fn reset(&self, identity: &Identity) -> Result<(), SyncError> {
        let _sweep = Arc::clone(&self.inner.sweep)
            .try_lock_owned()
            .map_err(|_| SyncError::SyncInProgress {
                scope: Scope::System,
            })?;
        let _permits = self.inner.locks.try_acquire_all().inspect_err(|e| {
            warn!(error = %e, "Reset rejected while syncing");
        })?;

        let runner = &self.inner.runner;
        let cleared = runner.queue().clear().await?;
        runner.storage().clear_timestamps().await?;
        runner.registry().clear();

        info!(identity = %identity, cleared, "Sync state reset");
        Ok(())
    }

    fn set_system(&self, status: SyncStatus, step: &str) {
        self.inner
            .runner
            .registry()
            .set(Scope::System, status, Some(step.to_string()));
    }

    async fn system_step(&self, identity: &Identity, step: String) {
        self.set_system(SyncStatus::Syncing, &step);
        let queue_size = self.queue().size(None).await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read queue size");
            0
        });
        self.publish(SyncEvent::StatusUpdate {
            scope: Scope::System,
            identity: identity.clone(),
            status: SyncStatus::Syncing,
            step,
            queue_size,
        })
        .await;
    }

    async fn publish(&self, event: SyncEvent) {
        self.inner.runner.publisher().publish(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::transport::MockTransport;
    use serde_json::json;
    use std::time::Duration;

    fn identity() -> Identity {
        Identity::new("user-1").unwrap()
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.retry.base_delay_ms = 0;
        config.retry.max_delay_ms = 0;
        config.retry.jitter_ms = 0;
        config
    }

    async fn orchestrator_with(config: EngineConfig, transport: &MockTransport) -> SyncOrchestrator {
        SyncOrchestrator::builder(config)
            .storage(SqliteStorage::in_memory().await.unwrap())
            .transport_for_all(Arc::new(transport.clone()))
            .open()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn trigger_twice_runs_once() {
        let transport = MockTransport::new();
        transport.set_delay(Duration::from_millis(100));
        let orchestrator = orchestrator_with(config(), &transport).await;
        let mut started = orchestrator.subscribe_topic("sync_started");

        let first = orchestrator
            .trigger_domain_sync(Domain::Knowledge, Direction::Down, &identity())
            .unwrap();
        let second =
            orchestrator.trigger_domain_sync(Domain::Knowledge, Direction::Down, &identity());

        assert!(matches!(
            second,
            Err(SyncError::SyncInProgress { scope }) if scope == Scope::Domain(Domain::Knowledge)
        ));
        first.wait().await.unwrap();

        assert_eq!(transport.pull_calls().len(), 1);
        assert_eq!(started.drain().len(), 1);
        assert_eq!(orchestrator.get_status(Domain::Knowledge), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn never_two_cycles_syncing_at_once() {
        let transport = MockTransport::new();
        transport.set_delay(Duration::from_millis(20));
        let orchestrator = orchestrator_with(config(), &transport).await;
        let mut events = orchestrator.subscribe_topic("sync_started");

        let mut handles = Vec::new();
        let mut rejected = 0;
        for _ in 0..10 {
            match orchestrator.trigger_domain_sync(Domain::Goals, Direction::Down, &identity()) {
                Ok(handle) => handles.push(handle),
                Err(SyncError::SyncInProgress { .. }) => rejected += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        for handle in handles {
            handle.wait().await.unwrap();
        }

        assert_eq!(rejected, 9);
        assert_eq!(events.drain().len(), 1);
    }

    #[tokio::test]
    async fn sweep_isolates_failures() {
        let healthy = MockTransport::new();
        let broken = MockTransport::new();
        broken.set_unreachable("connection refused");

        let orchestrator = SyncOrchestrator::builder(config())
            .storage(SqliteStorage::in_memory().await.unwrap())
            .transport(Domain::Tasks, Arc::new(broken.clone()))
            .transport(Domain::Goals, Arc::new(healthy.clone()))
            .open()
            .await
            .unwrap();
        let mut system_errors = orchestrator.subscribe_topic("sync_error");

        let result = orchestrator.sync_all(&identity()).await.unwrap();

        assert!(!result.per_domain[&Domain::Tasks].is_ok());
        assert!(result.per_domain[&Domain::Goals].is_ok());
        assert_eq!(result.overall, SyncStatus::Error);
        assert_eq!(result.failed_domains(), vec![Domain::Tasks]);

        assert!(orchestrator.get_last_sync_timestamp(Domain::Goals).is_some());
        assert!(orchestrator.get_last_sync_timestamp(Domain::Tasks).is_none());
        assert_eq!(orchestrator.get_status(Domain::Tasks), SyncStatus::Error);
        assert_eq!(orchestrator.get_status(Domain::Goals), SyncStatus::Idle);
        assert_eq!(orchestrator.get_status(Scope::System), SyncStatus::Error);
        assert!(orchestrator.get_last_sync_timestamp(Scope::System).is_none());

        let scopes: Vec<Scope> = system_errors.drain().iter().map(SyncEvent::scope).collect();
        assert_eq!(scopes, vec![Scope::Domain(Domain::Tasks), Scope::System]);
    }

    #[tokio::test]
    async fn parallel_sweep_aggregates_deterministically() {
        let transport = MockTransport::new();
        let mut config = config();
        config.sweep.parallel = true;
        let orchestrator = orchestrator_with(config, &transport).await;
        transport.fail_next_pull("flaky");

        let result = orchestrator.sync_all(&identity()).await.unwrap();

        assert_eq!(result.per_domain.len(), Domain::ALL.len());
        assert_eq!(result.failed_domains().len(), 1);
        assert_eq!(result.overall, SyncStatus::Error);
    }

    #[tokio::test]
    async fn successful_sweep_sets_system_idle() {
        let transport = MockTransport::new();
        let orchestrator = orchestrator_with(config(), &transport).await;
        let mut events = orchestrator.subscribe();

        let result = orchestrator.sync_all(&identity()).await.unwrap();

        assert!(result.is_ok());
        assert!(result.finished_at >= result.started_at);
        assert_eq!(orchestrator.get_status(Scope::System), SyncStatus::Idle);
        assert!(orchestrator.get_last_sync_timestamp(Scope::System).is_some());

        let system: Vec<String> = events
            .drain()
            .into_iter()
            .filter(|e| e.scope() == Scope::System)
            .map(|e| e.topic())
            .collect();
        assert_eq!(system.first().map(String::as_str), Some("sync_started"));
        assert_eq!(system.last().map(String::as_str), Some("sync_completed"));
    }

    #[tokio::test]
    async fn configured_sweep_order_is_followed() {
        let transport = MockTransport::new();
        let mut config = config();
        config.sweep.domains = Some(vec![Domain::Analytics, Domain::Knowledge]);
        let orchestrator = orchestrator_with(config, &transport).await;

        orchestrator.sync_all(&identity()).await.unwrap();

        let pulled: Vec<Domain> = transport.pull_calls().iter().map(|(d, _)| *d).collect();
        assert_eq!(pulled, vec![Domain::Analytics, Domain::Knowledge]);
    }

    #[tokio::test]
    async fn timestamps_only_move_forward() {
        let transport = MockTransport::new();
        let orchestrator = orchestrator_with(config(), &transport).await;

        let mut last = None;
        for round in 0..3 {
            if round == 1 {
                transport.fail_next_pull("offline");
            }
            let _ = orchestrator
                .sync_domain(Domain::Runes, Direction::Down, &identity())
                .await;
            let now = orchestrator.get_last_sync_timestamp(Domain::Runes);
            assert!(now >= last);
            last = now;
        }
    }

    #[tokio::test]
    async fn remote_change_is_idempotent() {
        let transport = MockTransport::new();
        let store = Arc::new(MemoryStore::new());
        let orchestrator = SyncOrchestrator::builder(config())
            .storage(SqliteStorage::in_memory().await.unwrap())
            .local_store(store.clone())
            .transport_for_all(Arc::new(transport))
            .open()
            .await
            .unwrap();
        let mut realtime = orchestrator.subscribe_topic("goals_realtime_changed");
        let record = Record::new("g1", json!({"v": 2})).with_version(2);

        let first = orchestrator
            .handle_remote_change(Domain::Goals, record.clone(), ChangeType::Update, &identity())
            .await
            .unwrap();
        let once = store.records(Domain::Goals);
        let second = orchestrator
            .handle_remote_change(Domain::Goals, record, ChangeType::Update, &identity())
            .await
            .unwrap();

        assert_eq!(first, MergeOutcome::Applied);
        assert_eq!(second, MergeOutcome::Unchanged);
        assert_eq!(store.records(Domain::Goals), once);
        assert_eq!(realtime.drain().len(), 1);
    }

    #[tokio::test]
    async fn unbound_domain_is_rejected() {
        let orchestrator = SyncOrchestrator::builder(config())
            .storage(SqliteStorage::in_memory().await.unwrap())
            .transport(Domain::Goals, Arc::new(MockTransport::new()))
            .open()
            .await
            .unwrap();

        let err = orchestrator
            .handle_local_change(Domain::Tasks, ChangeOperation::Create, json!({}), &identity())
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::UnknownDomain("tasks".into()));

        let err = orchestrator
            .handle_remote_change(
                Domain::Tasks,
                Record::new("t1", json!({})),
                ChangeType::Insert,
                &identity(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownDomain(_)));
        assert!(orchestrator
            .trigger_domain_sync(Domain::Tasks, Direction::Up, &identity())
            .is_err());
    }

    #[tokio::test]
    async fn sync_on_write_pushes_immediately() {
        let transport = MockTransport::new();
        let mut config = config();
        config.policy.sync_on_write = true;
        let orchestrator = orchestrator_with(config, &transport).await;
        let mut completed = orchestrator.subscribe_topic("sync_completed");

        let id = orchestrator
            .handle_local_change(
                Domain::Tasks,
                ChangeOperation::Create,
                json!({"title": "a"}),
                &identity(),
            )
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), completed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.scope(), Scope::Domain(Domain::Tasks));
        assert_eq!(transport.pushed_ids(), vec![id]);
        // up-only: nothing pulled
        assert!(transport.pull_calls().is_empty());
    }

    #[tokio::test]
    async fn local_change_waits_without_policy() {
        let transport = MockTransport::new();
        let orchestrator = orchestrator_with(config(), &transport).await;

        orchestrator
            .handle_local_change(Domain::Tasks, ChangeOperation::Update, json!({}), &identity())
            .await
            .unwrap();
        assert_eq!(orchestrator.queue().size(Some(Domain::Tasks)).await.unwrap(), 1);
        assert_eq!(transport.push_calls(), 0);
    }

    #[tokio::test]
    async fn timestamps_and_queue_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dsync.db");
        let transport = MockTransport::new();
        let mut ids = Vec::new();

        let synced_at = {
            let orchestrator = SyncOrchestrator::builder(config())
                .storage(SqliteStorage::open(&path).await.unwrap())
                .transport_for_all(Arc::new(transport.clone()))
                .open()
                .await
                .unwrap();
            orchestrator
                .sync_domain(Domain::Goals, Direction::Down, &identity())
                .await
                .unwrap();
            for n in 0..3 {
                ids.push(
                    orchestrator
                        .handle_local_change(
                            Domain::Tasks,
                            ChangeOperation::Create,
                            json!({ "n": n }),
                            &identity(),
                        )
                        .await
                        .unwrap(),
                );
            }
            orchestrator.get_last_sync_timestamp(Domain::Goals)
        };

        let mut config = config();
        config.storage.database = path;
        let reopened = SyncOrchestrator::builder(config)
            .transport_for_all(Arc::new(transport))
            .open()
            .await
            .unwrap();

        assert_eq!(reopened.get_last_sync_timestamp(Domain::Goals), synced_at);
        let drained = reopened.queue().drain(Domain::Tasks).await.unwrap();
        assert_eq!(drained.iter().map(|e| e.id).collect::<Vec<_>>(), ids);
    }

    #[tokio::test]
    async fn reset_forgets_everything_but_is_blocked_while_syncing() {
        let transport = MockTransport::new();
        let orchestrator = orchestrator_with(config(), &transport).await;
        orchestrator
            .sync_domain(Domain::Goals, Direction::Down, &identity())
            .await
            .unwrap();
        orchestrator
            .handle_local_change(Domain::Goals, ChangeOperation::Create, json!({}), &identity())
            .await
            .unwrap();

        transport.set_delay(Duration::from_millis(100));
        let running = orchestrator
            .trigger_domain_sync(Domain::Knowledge, Direction::Down, &identity())
            .unwrap();
        assert!(matches!(
            orchestrator.reset(&identity()).await,
            Err(SyncError::SyncInProgress { .. })
        ));
        running.wait().await.unwrap();

        orchestrator.reset(&identity()).await.unwrap();
        assert_eq!(orchestrator.get_status(Domain::Goals), SyncStatus::Unknown);
        assert!(orchestrator.get_last_sync_timestamp(Domain::Goals).is_none());
        assert_eq!(orchestrator.queue().size(None).await.unwrap(), 0);
        assert!(orchestrator.states().is_empty());
    }
}
