//! Settings resolution for dsync.

use anyhow::{Context, Result};
use dsync_engine::EngineConfig;
use dsync_types::Identity;
use std::path::Path;

/// Load the engine configuration for a data directory.
///
/// Without a file the defaults apply. A relative database path is taken
/// relative to `data_dir`.
pub fn resolve(config_file: Option<&Path>, data_dir: &Path) -> Result<EngineConfig> {
    let mut config = match config_file {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if config.storage.database.is_relative() {
        config.storage.database = data_dir.join(&config.storage.database);
    }
    Ok(config)
}

/// The caller identity, required by commands that change state.
pub fn identity(token: Option<&str>) -> Result<Identity> {
    Identity::require(token).context("An identity is required: pass --identity or set DSYNC_IDENTITY")
}
