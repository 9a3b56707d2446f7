//! Configuration loading for the sync engine.
//!
//! Configuration is loaded from a TOML file (default: `dsync.toml`). Every
//! section and field is optional; a missing value takes its default.

use dsync_core::RetryPolicy;
use dsync_types::Domain;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Durable storage configuration.
    pub storage: StorageConfig,
    /// Change queue configuration.
    pub queue: QueueConfig,
    /// Push retry backoff.
    pub retry: RetryConfig,
    /// Event fan-out configuration.
    pub events: EventsConfig,
    /// Full sweep configuration.
    pub sweep: SweepConfig,
    /// Collaborator policies.
    pub policy: PolicyConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database holding the queue and timestamps.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Change queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Push attempts before an entry is dead-lettered (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Maximum entries pushed per domain per cycle (default: 10).
    #[serde(default = "default_push_batch_size")]
    pub push_batch_size: usize,
}

/// Retry backoff configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Delay after the first failed push in milliseconds (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap for the exponential delay in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Maximum random jitter in milliseconds (default: 250).
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

/// Event fan-out configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// How long a publish waits on a full subscriber before skipping it (default: 250).
    #[serde(default = "default_subscriber_timeout_ms")]
    pub subscriber_timeout_ms: u64,
    /// Buffered events per subscriber (default: 64).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Full sweep configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SweepConfig {
    /// Run domains concurrently instead of one after another (default: false).
    #[serde(default)]
    pub parallel: bool,
    /// Explicit sweep order. Defaults to every bound domain in canonical order.
    #[serde(default)]
    pub domains: Option<Vec<Domain>>,
}

/// Collaborator policies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyConfig {
    /// Push a domain right after a local change is queued (default: false).
    #[serde(default)]
    pub sync_on_write: bool,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("dsync.db")
}

fn default_max_attempts() -> u32 {
    dsync_core::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_push_batch_size() -> usize {
    10
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    250
}

fn default_subscriber_timeout_ms() -> u64 {
    250
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            push_batch_size: default_push_batch_size(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_timeout_ms: default_subscriber_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_attempts == 0 {
            return Err(ConfigError::Invalid("queue.max_attempts must be at least 1".into()));
        }
        if self.queue.push_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "queue.push_batch_size must be at least 1".into(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "events.channel_capacity must be at least 1".into(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        if let Some(domains) = &self.sweep.domains {
            for (i, domain) in domains.iter().enumerate() {
                if domains[..i].contains(domain) {
                    return Err(ConfigError::Invalid(format!(
                        "sweep.domains lists {domain} twice"
                    )));
                }
            }
        }
        Ok(())
    }

    /// The push retry policy described by `[queue]` and `[retry]`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.queue.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: Duration::from_millis(self.retry.jitter_ms),
        }
    }

    /// How long a publish waits on one subscriber.
    pub fn subscriber_timeout(&self) -> Duration {
        Duration::from_millis(self.events.subscriber_timeout_ms)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.push_batch_size, 10);
        assert_eq!(config.storage.database, PathBuf::from("dsync.db"));
        assert!(!config.sweep.parallel);
        assert!(config.sweep.domains.is_none());
        assert!(!config.policy.sync_on_write);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[storage]
database = "/var/lib/dsync/queue.db"

[queue]
max_attempts = 3
push_batch_size = 25

[retry]
base_delay_ms = 500
max_delay_ms = 10000
jitter_ms = 0

[events]
subscriber_timeout_ms = 100
channel_capacity = 8

[sweep]
parallel = true
domains = ["goals", "tasks"]

[policy]
sync_on_write = true
"#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.database, PathBuf::from("/var/lib/dsync/queue.db"));
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.push_batch_size, 25);
        assert_eq!(config.events.channel_capacity, 8);
        assert!(config.sweep.parallel);
        assert_eq!(
            config.sweep.domains,
            Some(vec![Domain::Goals, Domain::Tasks])
        );
        assert!(config.policy.sync_on_write);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.jitter, Duration::ZERO);
        assert_eq!(config.subscriber_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: EngineConfig = toml::from_str("[queue]\nmax_attempts = 2\n").unwrap();
        assert_eq!(config.queue.max_attempts, 2);
        assert_eq!(config.queue.push_batch_size, 10);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.events.subscriber_timeout_ms, 250);
    }

    #[test]
    fn unknown_sweep_domain_fails_to_parse() {
        let result: Result<EngineConfig, _> = toml::from_str("[sweep]\ndomains = [\"files\"]\n");
        assert!(result.is_err());
    }

    #[test]
    fn from_file_reports_path_on_missing_file() {
        let err = EngineConfig::from_file(std::path::Path::new("/nonexistent/dsync.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
        assert!(err.to_string().contains("/nonexistent/dsync.toml"));
    }

    #[test]
    fn from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[queue]\npush_batch_size = 0").unwrap();

        let err = EngineConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn duplicate_sweep_domain_is_invalid() {
        let config: EngineConfig =
            toml::from_str("[sweep]\ndomains = [\"goals\", \"goals\"]\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
