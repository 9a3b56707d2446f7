//! # sync-core
//!
//! Pure logic for the domain sync engine (no I/O, instant tests).
//!
//! This crate holds the in-memory bookkeeping and policies used by the
//! engine without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! Modules here never suspend and never touch storage:
//! - [`StatusRegistry`] owns the status, current step and last-success
//!   timestamp of every scope
//! - [`RetryPolicy`] decides when a failed push may be retried and when
//!   it is dead-lettered
//!
//! The actual I/O (transport, durable queue) is performed by `sync-engine`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod retry;
pub mod status;

pub use retry::RetryPolicy;
pub use status::StatusRegistry;
