//! Validate an engine configuration file.

use anyhow::{Context, Result};
use dsync_engine::EngineConfig;
use dsync_types::Domain;
use std::path::Path;

/// Run the config check command.
pub fn run(path: &Path) -> Result<()> {
    let config = EngineConfig::from_file(path)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    let order = config
        .sweep
        .domains
        .as_deref()
        .unwrap_or(&Domain::ALL)
        .iter()
        .map(Domain::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    println!("Configuration OK: {}", path.display());
    println!("  Database:      {}", config.storage.database.display());
    println!(
        "  Queue:         {} attempts, {} per push batch",
        config.queue.max_attempts, config.queue.push_batch_size
    );
    println!(
        "  Retry:         {}ms base, {}ms max, {}ms jitter",
        config.retry.base_delay_ms, config.retry.max_delay_ms, config.retry.jitter_ms
    );
    println!(
        "  Sweep:         {} ({})",
        order,
        if config.sweep.parallel { "parallel" } else { "sequential" }
    );
    println!("  Sync on write: {}", config.policy.sync_on_write);

    Ok(())
}
