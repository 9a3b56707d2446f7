//! Specialized multi-step flows.
//!
//! A flow is a domain cycle whose work is done by a [`FlowBackend`] in
//! named steps instead of by a [`RemoteTransport`](crate::RemoteTransport).
//! It takes the same domain permit, moves through the same status and
//! events, and leaves an audit record in the knowledge store whether it
//! succeeds or not.

use crate::audit::AuditEntry;
use crate::orchestrator::SyncOrchestrator;
use crate::transport::TransportError;
use async_trait::async_trait;
use dsync_types::{Direction, Domain, DomainOutcome, Identity, SyncError};
use std::fmt;
use tracing::{debug, info, warn};

/// Which flow runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    /// Sync the repository of the mobile app's working copy.
    MobileRepository,
    /// Sync stored workflow definitions.
    WorkflowDefinitions,
}

impl FlowKind {
    /// Domain whose permit and status the flow uses.
    pub fn domain(&self) -> Domain {
        match self {
            FlowKind::MobileRepository => Domain::Analytics,
            FlowKind::WorkflowDefinitions => Domain::Tasks,
        }
    }

    /// Tag used in audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::MobileRepository => "mobile-repository",
            FlowKind::WorkflowDefinitions => "workflow-definitions",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            FlowKind::MobileRepository => "Mobile repository sync",
            FlowKind::WorkflowDefinitions => "Workflow definition sync",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named step of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    /// Inspect local and remote state.
    CheckingStatus,
    /// Fetch remote changes.
    Pulling,
    /// Record local changes.
    Committing,
    /// Send local changes.
    Pushing,
}

impl FlowStep {
    /// Step name as shown in status updates.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStep::CheckingStatus => "checking status",
            FlowStep::Pulling => "pulling",
            FlowStep::Committing => "committing",
            FlowStep::Pushing => "pushing",
        }
    }

    /// Steps a flow runs for `direction`, in order.
    pub fn plan(direction: Direction) -> Vec<FlowStep> {
        let mut steps = vec![FlowStep::CheckingStatus];
        if direction.pulls() {
            steps.push(FlowStep::Pulling);
        }
        if direction.pushes() {
            steps.push(FlowStep::Committing);
            steps.push(FlowStep::Pushing);
        }
        steps
    }
}

/// Performs the steps of a flow. Each call returns a one-line summary.
#[async_trait]
pub trait FlowBackend: Send + Sync {
    /// Inspect local and remote state.
    async fn check_status(&self) -> Result<String, TransportError>;
    /// Fetch remote changes.
    async fn pull(&self) -> Result<String, TransportError>;
    /// Record local changes.
    async fn commit(&self) -> Result<String, TransportError>;
    /// Send local changes.
    async fn push(&self) -> Result<String, TransportError>;
}

/// One finished step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// The step.
    pub step: FlowStep,
    /// Backend summary.
    pub detail: String,
}

/// Result of a flow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowReport {
    /// Flow that ran.
    pub kind: FlowKind,
    /// Direction it ran in.
    pub direction: Direction,
    /// Steps that completed, in order.
    pub steps: Vec<StepRecord>,
    /// Overall outcome.
    pub outcome: DomainOutcome,
}

impl FlowReport {
    fn audit_entry(&self) -> AuditEntry {
        let mut body: Vec<String> = self
            .steps
            .iter()
            .map(|s| format!("- {}: {}", s.step.as_str(), s.detail))
            .collect();
        let result_tag = match &self.outcome {
            DomainOutcome::Ok => "sync-success",
            DomainOutcome::Error { detail } => {
                body.push(format!("failed: {detail}"));
                "sync-failure"
            }
        };
        AuditEntry {
            title: format!("{} ({})", self.kind.title(), self.direction),
            body: body.join("\n"),
            tags: vec![
                "sync".to_string(),
                self.kind.as_str().to_string(),
                self.direction.as_str().to_string(),
                result_tag.to_string(),
            ],
        }
    }
}

fn step_error(step: FlowStep, err: TransportError) -> SyncError {
    match err {
        TransportError::Unreachable(_) | TransportError::Timeout => {
            SyncError::Network(format!("{}: {err}", step.as_str()))
        }
        TransportError::Rejected(_) | TransportError::Protocol(_) => {
            SyncError::Internal(format!("{} failed: {err}", step.as_str()))
        }
    }
}

impl SyncOrchestrator {
    /// Run a specialized flow.
    ///
    /// Returns `Err` only when the flow could not start (the domain is
    /// already syncing); a failing step is reported in the
    /// [`FlowReport`], the domain status and a `sync_error` event.
    pub async fn run_flow(
        &self,
        kind: FlowKind,
        backend: &dyn FlowBackend,
        direction: Direction,
        identity: &Identity,
    ) -> Result<FlowReport, SyncError> {
        let domain = kind.domain();
        let _permit = self.acquire(domain)?;
        let runner = &self.inner.runner;

        info!(flow = %kind, %direction, "Flow started");
        runner.begin(domain, identity).await;

        let mut steps = Vec::new();
        let mut failure = None;
        for step in FlowStep::plan(direction) {
            runner.step(domain, identity, step.as_str()).await;
            let result = match step {
                FlowStep::CheckingStatus => backend.check_status().await,
                FlowStep::Pulling => backend.pull().await,
                FlowStep::Committing => backend.commit().await,
                FlowStep::Pushing => backend.push().await,
            };
            match result {
                Ok(detail) => steps.push(StepRecord { step, detail }),
                Err(e) => {
                    failure = Some(step_error(step, e));
                    break;
                }
            }
        }

        if failure.is_none() {
            if let Err(err) = runner
                .finish_ok(domain, identity, format!("{kind} sync complete"))
                .await
            {
                failure = Some(err);
            }
        }

        let outcome = match &failure {
            None => DomainOutcome::Ok,
            Some(err) => {
                runner.finish_err(domain, identity, err).await;
                DomainOutcome::Error {
                    detail: err.to_string(),
                }
            }
        };

        let report = FlowReport {
            kind,
            direction,
            steps,
            outcome,
        };

        match &self.inner.audit {
            Some(sink) => {
                if let Err(e) = sink.record(report.audit_entry()).await {
                    warn!(flow = %kind, error = %e, "Could not write flow audit record");
                }
            }
            None => debug!(flow = %kind, "No audit sink configured"),
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::EngineConfig;
    use crate::storage::SqliteStorage;
    use crate::transport::MockTransport;
    use dsync_types::{Scope, SyncEvent, SyncStatus};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct ScriptedBackend {
        calls: Mutex<Vec<FlowStep>>,
        fail_at: Option<FlowStep>,
    }

    impl ScriptedBackend {
        fn failing_at(step: FlowStep) -> Self {
            Self {
                fail_at: Some(step),
                ..Self::default()
            }
        }

        fn run(&self, step: FlowStep) -> Result<String, TransportError> {
            self.calls.lock().unwrap().push(step);
            if self.fail_at == Some(step) {
                return Err(TransportError::Unreachable("remote hung up".into()));
            }
            Ok(format!("{} ok", step.as_str()))
        }
    }

    #[async_trait]
    impl FlowBackend for ScriptedBackend {
        async fn check_status(&self) -> Result<String, TransportError> {
            self.run(FlowStep::CheckingStatus)
        }
        async fn pull(&self) -> Result<String, TransportError> {
            self.run(FlowStep::Pulling)
        }
        async fn commit(&self) -> Result<String, TransportError> {
            self.run(FlowStep::Committing)
        }
        async fn push(&self) -> Result<String, TransportError> {
            self.run(FlowStep::Pushing)
        }
    }

    fn identity() -> Identity {
        Identity::new("user-1").unwrap()
    }

    async fn orchestrator(sink: Option<Arc<MemoryAuditSink>>) -> SyncOrchestrator {
        let mut builder = SyncOrchestrator::builder(EngineConfig::default())
            .storage(SqliteStorage::in_memory().await.unwrap())
            .transport_for_all(Arc::new(MockTransport::new()));
        if let Some(sink) = sink {
            builder = builder.audit_sink(sink);
        }
        builder.open().await.unwrap()
    }

    #[test]
    fn plan_follows_direction() {
        assert_eq!(
            FlowStep::plan(Direction::Down),
            vec![FlowStep::CheckingStatus, FlowStep::Pulling]
        );
        assert_eq!(
            FlowStep::plan(Direction::Bidirectional),
            vec![
                FlowStep::CheckingStatus,
                FlowStep::Pulling,
                FlowStep::Committing,
                FlowStep::Pushing
            ]
        );
    }

    #[tokio::test]
    async fn successful_flow_reports_steps_and_audits() {
        let sink = Arc::new(MemoryAuditSink::new());
        let orchestrator = orchestrator(Some(sink.clone())).await;
        let mut updates = orchestrator.subscribe_topic("sync_status_update");
        let backend = ScriptedBackend::default();

        let report = orchestrator
            .run_flow(
                FlowKind::MobileRepository,
                &backend,
                Direction::Bidirectional,
                &identity(),
            )
            .await
            .unwrap();

        assert_eq!(report.outcome, DomainOutcome::Ok);
        assert_eq!(report.steps.len(), 4);

        let steps: Vec<String> = updates
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                SyncEvent::StatusUpdate { step, .. } => Some(step),
                _ => None,
            })
            .collect();
        assert_eq!(steps, vec!["checking status", "pulling", "committing", "pushing"]);

        let domain = FlowKind::MobileRepository.domain();
        assert_eq!(orchestrator.get_status(domain), SyncStatus::Idle);
        assert!(orchestrator.get_last_sync_timestamp(domain).is_some());

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Mobile repository sync (bidirectional)");
        assert_eq!(
            entries[0].tags,
            vec!["sync", "mobile-repository", "bidirectional", "sync-success"]
        );
        assert!(entries[0].body.contains("- pushing: pushing ok"));
    }

    #[tokio::test]
    async fn failing_step_stops_flow_and_audits_failure() {
        let sink = Arc::new(MemoryAuditSink::new());
        let orchestrator = orchestrator(Some(sink.clone())).await;
        let mut errors = orchestrator.subscribe_topic("sync_error");
        let backend = ScriptedBackend::failing_at(FlowStep::Pulling);

        let report = orchestrator
            .run_flow(
                FlowKind::WorkflowDefinitions,
                &backend,
                Direction::Bidirectional,
                &identity(),
            )
            .await
            .unwrap();

        assert!(!report.outcome.is_ok());
        assert_eq!(report.steps.len(), 1);
        assert_eq!(
            *backend.calls.lock().unwrap(),
            vec![FlowStep::CheckingStatus, FlowStep::Pulling]
        );
        assert_eq!(orchestrator.get_status(Domain::Tasks), SyncStatus::Error);
        assert!(orchestrator.get_last_sync_timestamp(Domain::Tasks).is_none());

        let events = errors.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].scope(), Scope::Domain(Domain::Tasks));

        let tags = &sink.entries()[0].tags;
        assert!(tags.contains(&"sync-failure".to_string()));
        assert!(tags.contains(&"workflow-definitions".to_string()));
    }

    #[tokio::test]
    async fn audit_failure_does_not_fail_flow() {
        let sink = Arc::new(MemoryAuditSink::new());
        sink.fail_with("read-only");
        let orchestrator = orchestrator(Some(sink)).await;

        let report = orchestrator
            .run_flow(
                FlowKind::MobileRepository,
                &ScriptedBackend::default(),
                Direction::Down,
                &identity(),
            )
            .await
            .unwrap();
        assert!(report.outcome.is_ok());
    }

    #[tokio::test]
    async fn flow_without_sink_still_runs() {
        let orchestrator = orchestrator(None).await;
        let report = orchestrator
            .run_flow(
                FlowKind::MobileRepository,
                &ScriptedBackend::default(),
                Direction::Up,
                &identity(),
            )
            .await
            .unwrap();
        assert_eq!(report.steps.len(), 3);
    }

    #[tokio::test]
    async fn flow_respects_domain_permit() {
        let orchestrator = orchestrator(None).await;
        let _held = orchestrator.acquire(FlowKind::WorkflowDefinitions.domain()).unwrap();

        let err = orchestrator
            .run_flow(
                FlowKind::WorkflowDefinitions,
                &ScriptedBackend::default(),
                Direction::Bidirectional,
                &identity(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SyncInProgress { .. }));
    }
}
