//! # dsync-engine
//!
//! Sync engine that keeps a fixed set of data domains consistent between a
//! local copy and a remote source of truth.
//!
//! ## Overview
//!
//! - [`SyncOrchestrator`] is the entry point: it triggers per-domain
//!   cycles, runs full sweeps and ingests remote and local changes
//! - [`DomainSyncRunner`] runs one pull-merge-push cycle for one domain
//! - [`ChangeQueue`] holds local changes durably until the remote confirms
//!   them
//! - [`EventPublisher`] announces lifecycle events to observers
//!
//! Collaborators plug in through [`RemoteTransport`], [`LocalStore`] and
//! [`KnowledgeSink`]. In-memory implementations of each ship with the crate
//! for tests.
//!
//! ## Example
//!
//! ```ignore
//! use dsync_engine::{EngineConfig, MockTransport, SyncOrchestrator};
//! use dsync_types::{Domain, Identity};
//! use std::sync::Arc;
//!
//! let engine = SyncOrchestrator::builder(EngineConfig::default())
//!     .transport_for_all(Arc::new(MockTransport::new()))
//!     .open()
//!     .await?;
//! let identity = Identity::new("user-1")?;
//! let sweep = engine.sync_all(&identity).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod flows;
pub mod orchestrator;
pub mod permit;
pub mod runner;
pub mod storage;
pub mod store;
pub mod transport;

pub use audit::{AuditEntry, AuditError, KnowledgeSink, MemoryAuditSink};
pub use config::{ConfigError, EngineConfig};
pub use error::StorageError;
pub use events::{EventPublisher, Subscription};
pub use flows::{FlowBackend, FlowKind, FlowReport, FlowStep, StepRecord};
pub use orchestrator::{SyncHandle, SyncOrchestrator, SyncOrchestratorBuilder};
pub use permit::{DomainLocks, DomainPermit};
pub use runner::{CycleReport, DomainSyncRunner};
pub use storage::{ChangeQueue, FailOutcome, SqliteStorage};
pub use store::{LocalStore, MemoryStore, MergeOutcome, StoreError};
pub use transport::{MockTransport, RemoteTransport, TransportError};
