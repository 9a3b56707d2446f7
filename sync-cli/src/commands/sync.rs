//! Run a sync against the loopback transport.
//!
//! The loopback transport accepts every push and has nothing to pull, so
//! this drains the local queue and shows the events a real cycle emits.

use anyhow::{Context, Result};
use dsync_engine::{EngineConfig, MockTransport, SyncOrchestrator};
use dsync_types::{Direction, Domain, DomainOutcome, Identity};
use std::sync::Arc;
use tracing::warn;

/// Run the sync command.
pub async fn run(
    config: EngineConfig,
    identity: &Identity,
    domain: Option<Domain>,
    direction: Direction,
) -> Result<()> {
    let engine = SyncOrchestrator::builder(config)
        .transport_for_all(Arc::new(MockTransport::new()))
        .open()
        .await
        .context("Failed to open sync engine")?;

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => println!("[{}] {}", event.topic(), json),
                Err(e) => warn!(error = %e, "Failed to encode event"),
            }
        }
    });

    let result = match domain {
        Some(domain) => engine
            .sync_domain(domain, direction, identity)
            .await
            .map(|report| {
                println!();
                println!(
                    "{}: pulled {}, applied {}, pushed {}{}",
                    report.domain,
                    report.pulled,
                    report.applied,
                    report.pushed,
                    if report.deferred { " (push deferred)" } else { "" }
                );
            }),
        None => engine.sync_all(identity).await.map(|sweep| {
            println!();
            for (domain, outcome) in &sweep.per_domain {
                match outcome {
                    DomainOutcome::Ok => println!("  {:<14} ok", domain.as_str()),
                    DomainOutcome::Error { detail } => {
                        println!("  {:<14} error: {}", domain.as_str(), detail)
                    }
                }
            }
            println!("Overall: {}", sweep.overall);
        }),
    };

    // Closing the engine closes the subscription and ends the printer
    drop(engine);
    printer.await.context("Event printer failed")?;

    result.context("Sync failed")
}
