//! Knowledge-store audit sink used by specialized flows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// A human-readable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Short title.
    pub title: String,
    /// Free-form body.
    pub body: String,
    /// Tags for later lookup.
    pub tags: Vec<String>,
}

/// Audit sink errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// The sink could not take the entry.
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Where specialized flows write their audit records.
#[async_trait]
pub trait KnowledgeSink: Send + Sync {
    /// Store one entry.
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Audit sink that keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    fail_with: Mutex<Option<String>>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries recorded so far.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Refuse every entry from now on.
    pub fn fail_with(&self, reason: &str) {
        *self.fail_with.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());
    }
}

#[async_trait]
impl KnowledgeSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        if let Some(reason) = self
            .fail_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(AuditError::Unavailable(reason));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> AuditEntry {
        AuditEntry {
            title: "Mobile repository sync".into(),
            body: "pulled 2 commits".into(),
            tags: vec!["mobile-repository".into(), "sync-success".into()],
        }
    }

    #[tokio::test]
    async fn records_entries() {
        let sink = MemoryAuditSink::new();
        sink.record(entry()).await.unwrap();
        assert_eq!(sink.entries(), vec![entry()]);
    }

    #[tokio::test]
    async fn failing_sink_rejects() {
        let sink = MemoryAuditSink::new();
        sink.fail_with("read-only");
        assert_eq!(
            sink.record(entry()).await,
            Err(AuditError::Unavailable("read-only".into()))
        );
        assert!(sink.entries().is_empty());
    }
}
