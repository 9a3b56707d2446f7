//! Show queue sizes and last successful sync per scope.

use anyhow::{Context, Result};
use dsync_engine::{EngineConfig, SqliteStorage};
use dsync_types::{Domain, Scope, Timestamp};
use std::collections::HashMap;

/// Run the status command.
pub async fn run(config: &EngineConfig) -> Result<()> {
    let storage = SqliteStorage::open(&config.storage.database)
        .await
        .context("Failed to open sync database")?;
    let queue = storage.change_queue(config.retry_policy());

    let last_sync: HashMap<Scope, Timestamp> = storage
        .load_timestamps()
        .await
        .context("Failed to read sync timestamps")?
        .into_iter()
        .collect();

    println!("=== dsync status ===");
    println!("Database: {}", config.storage.database.display());
    println!();
    println!("{:<14} {:>7} {:>6}  LAST SYNC", "SCOPE", "QUEUED", "DEAD");

    for domain in Domain::ALL {
        let queued = queue.size(Some(domain)).await?;
        let dead = queue.dead_letters(Some(domain)).await?.len();
        println!(
            "{:<14} {:>7} {:>6}  {}",
            domain.as_str(),
            queued,
            dead,
            describe(last_sync.get(&Scope::Domain(domain)).copied())
        );
    }

    let queued = queue.size(None).await?;
    let dead = queue.dead_letters(None).await?.len();
    println!(
        "{:<14} {:>7} {:>6}  {}",
        Scope::System.as_str(),
        queued,
        dead,
        describe(last_sync.get(&Scope::System).copied())
    );

    storage.close().await;
    Ok(())
}

fn describe(at: Option<Timestamp>) -> String {
    match at {
        Some(at) => format_timestamp(at, Timestamp::now()),
        None => "never".to_string(),
    }
}

/// Format a timestamp relative to `now`.
fn format_timestamp(at: Timestamp, now: Timestamp) -> String {
    let diff = now.millis_since(at) / 1000;

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}
