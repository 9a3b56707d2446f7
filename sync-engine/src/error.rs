//! Error types for the engine's storage seam.

use dsync_types::SyncError;
use std::path::PathBuf;

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Payload could not be encoded for storage.
    #[error("payload encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Stored payload could not be decoded.
    #[error("payload decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// A stored row does not describe a valid entry.
    #[error("corrupt row in {table}: {reason}")]
    Corrupt {
        /// Table the row was read from.
        table: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        SyncError::Storage(err.to_string())
    }
}
