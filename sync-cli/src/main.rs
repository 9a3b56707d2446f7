//! # dsync
//!
//! Operator CLI for the domain sync engine.
//!
//! ## Commands
//!
//! - `status`: Show queue sizes and last successful sync per scope
//! - `queue`: Inspect and edit the durable change queue
//! - `config check`: Validate an engine configuration file
//! - `sync`: Run a sweep (or one domain) against the loopback transport
//!
//! ## Example
//!
//! ```bash
//! # Queue a local change
//! dsync --identity alice queue enqueue tasks create '{"title": "write docs"}'
//!
//! # See what is waiting
//! dsync queue list --domain tasks
//!
//! # Push it and watch the events
//! dsync --identity alice sync
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dsync_engine::EngineConfig;
use dsync_types::{ChangeOperation, Direction, Domain};
use std::path::{Path, PathBuf};

mod commands;
mod settings;

use commands::{check, queue, status, sync};

/// Operator CLI for the domain sync engine.
#[derive(Parser, Debug)]
#[command(name = "dsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding the sync database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Engine configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Identity token for commands that change state
    #[arg(long, global = true, env = "DSYNC_IDENTITY")]
    identity: Option<String>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show queue sizes and last successful sync per scope
    Status,

    /// Inspect and edit the change queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run a sync against the loopback transport
    Sync {
        /// Only sync this domain (default: full sweep)
        #[arg(long)]
        domain: Option<Domain>,

        /// Direction for a single-domain sync
        #[arg(long, default_value = "bidirectional")]
        direction: Direction,
    },
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// List live entries, oldest first
    List {
        /// Only this domain
        #[arg(long)]
        domain: Option<Domain>,
    },

    /// List dead-lettered entries
    Dead {
        /// Only this domain
        #[arg(long)]
        domain: Option<Domain>,
    },

    /// Return a dead-lettered entry to the live queue
    Requeue {
        /// Entry id
        id: String,
    },

    /// Queue a local change
    Enqueue {
        /// Domain of the change
        domain: Domain,
        /// create, update or delete
        operation: ChangeOperation,
        /// JSON payload
        payload: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Parse and validate a configuration file
    Check {
        /// Path to the TOML file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Status => {
            let config = engine_config(cli.data_dir, cli.config.as_deref()).await?;
            status::run(&config).await?;
        }
        Commands::Queue { action } => {
            let config = engine_config(cli.data_dir, cli.config.as_deref()).await?;
            match action {
                QueueAction::List { domain } => queue::list(&config, domain).await?,
                QueueAction::Dead { domain } => queue::dead(&config, domain).await?,
                QueueAction::Requeue { id } => queue::requeue(&config, &id).await?,
                QueueAction::Enqueue {
                    domain,
                    operation,
                    payload,
                } => {
                    let identity = settings::identity(cli.identity.as_deref())?;
                    queue::enqueue(&config, &identity, domain, operation, &payload).await?
                }
            }
        }
        Commands::Config {
            action: ConfigAction::Check { file },
        } => {
            check::run(&file)?;
        }
        Commands::Sync { domain, direction } => {
            let identity = settings::identity(cli.identity.as_deref())?;
            let config = engine_config(cli.data_dir, cli.config.as_deref()).await?;
            sync::run(config, &identity, domain, direction).await?;
        }
    }

    Ok(())
}

/// Resolve the engine configuration, creating the data directory.
async fn engine_config(data_dir: Option<PathBuf>, config_file: Option<&Path>) -> Result<EngineConfig> {
    // Determine data directory
    let data_dir = match data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    settings::resolve(config_file, &data_dir)
}

/// Get the default data directory for dsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "junaikey", "dsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
