//! Remote transport abstraction.
//!
//! The engine reaches the remote source of truth only through
//! [`RemoteTransport`], one binding per domain. Timeouts are the
//! transport's business; they surface as [`TransportError::Timeout`].
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.queue_pull(Domain::Goals, vec![event]);
//! let changes = transport.pull(Domain::Goals, None).await?;
//! transport.push(&entry).await?;
//! ```

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use dsync_types::{ChangeQueueEntry, Domain, RemoteChangeEvent, Timestamp};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remote could not be reached.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The remote did not answer in time.
    #[error("remote timeout")]
    Timeout,

    /// The remote refused a pushed change.
    #[error("change rejected: {0}")]
    Rejected(String),

    /// The remote answered with something unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Connection to the remote for one or more domains.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Fetch remote changes for `domain`.
    ///
    /// `since` is the domain's last successful sync, so implementations
    /// may return only newer changes. `None` asks for everything.
    async fn pull(
        &self,
        domain: Domain,
        since: Option<Timestamp>,
    ) -> Result<Vec<RemoteChangeEvent>, TransportError>;

    /// Send one queued local change.
    async fn push(&self, entry: &ChangeQueueEntry) -> Result<(), TransportError>;
}
