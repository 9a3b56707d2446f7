//! Inspect and edit the durable change queue.

use anyhow::{bail, Context, Result};
use dsync_engine::{ChangeQueue, EngineConfig, SqliteStorage};
use dsync_types::{ChangeOperation, ChangeQueueEntry, Domain, EntryId, Identity};
use tracing::info;

async fn open(config: &EngineConfig) -> Result<(SqliteStorage, ChangeQueue)> {
    let storage = SqliteStorage::open(&config.storage.database)
        .await
        .context("Failed to open sync database")?;
    let queue = storage.change_queue(config.retry_policy());
    Ok((storage, queue))
}

fn domains(domain: Option<Domain>) -> Vec<Domain> {
    match domain {
        Some(domain) => vec![domain],
        None => Domain::ALL.to_vec(),
    }
}

/// Print live entries, oldest first per domain.
pub async fn list(config: &EngineConfig, domain: Option<Domain>) -> Result<()> {
    let (storage, queue) = open(config).await?;

    let mut total = 0;
    for domain in domains(domain) {
        let entries = queue.drain(domain).await?;
        total += entries.len();
        for entry in &entries {
            print_entry(entry);
        }
    }

    if total == 0 {
        println!("Queue is empty.");
    } else {
        println!();
        println!("{} queued change(s)", total);
    }

    storage.close().await;
    Ok(())
}

/// Print dead-lettered entries.
pub async fn dead(config: &EngineConfig, domain: Option<Domain>) -> Result<()> {
    let (storage, queue) = open(config).await?;

    let entries = queue.dead_letters(domain).await?;
    if entries.is_empty() {
        println!("No dead letters.");
    } else {
        for entry in &entries {
            print_entry(entry);
        }
        println!();
        println!("{} dead letter(s)", entries.len());
        println!("Run 'dsync queue requeue <id>' to retry one.");
    }

    storage.close().await;
    Ok(())
}

/// Move a dead-lettered entry back into the live queue.
pub async fn requeue(config: &EngineConfig, id: &str) -> Result<()> {
    let entry_id: EntryId = id
        .parse()
        .with_context(|| format!("Invalid entry id: {}", id))?;
    let (storage, queue) = open(config).await?;

    let requeued = queue.requeue_dead_letter(entry_id).await?;
    storage.close().await;

    if !requeued {
        bail!("No dead-lettered entry with id {}", entry_id);
    }
    info!(entry_id = %entry_id, "Dead letter requeued");
    println!("Requeued {}", entry_id);
    Ok(())
}

/// Queue a local change for the next push.
pub async fn enqueue(
    config: &EngineConfig,
    identity: &Identity,
    domain: Domain,
    operation: ChangeOperation,
    payload: &str,
) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("Payload must be valid JSON")?;
    let (storage, queue) = open(config).await?;

    let id = queue.enqueue(domain, operation, &payload).await?;
    let size = queue.size(Some(domain)).await?;
    storage.close().await;

    info!(%domain, %operation, entry_id = %id, identity = %identity, "Local change queued");
    println!("Queued {} ({} {}, {} waiting)", id, domain, operation, size);
    Ok(())
}

fn print_entry(entry: &ChangeQueueEntry) {
    println!(
        "{}  {:<13} {:<6} attempts={}",
        entry.id,
        entry.domain.as_str(),
        entry.operation.as_str(),
        entry.attempts
    );
    if let Some(error) = &entry.last_error {
        println!("    last error: {}", error);
    }
    println!("    {}", entry.payload);
}
