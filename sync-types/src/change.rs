//! Local and remote change records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::Domain;
use crate::error::SyncError;
use crate::ids::{EntryId, Timestamp};

/// Kind of local mutation waiting to be pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    /// A new record.
    Create,
    /// A modified record.
    Update,
    /// A removed record.
    Delete,
}

impl ChangeOperation {
    /// Lowercase name, as stored in the queue.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Create => "create",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        }
    }
}

impl FromStr for ChangeOperation {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeOperation::Create),
            "update" => Ok(ChangeOperation::Update),
            "delete" => Ok(ChangeOperation::Delete),
            other => Err(SyncError::Internal(format!("unknown operation: {other}"))),
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of change reported by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// A record appeared remotely.
    Insert,
    /// A record changed remotely.
    Update,
    /// A record was removed remotely.
    Delete,
}

impl ChangeType {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Insert => "insert",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain record as seen by the engine.
///
/// The engine reads only `id` and `version`; `data` is opaque and handed
/// to the local store untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier, unique within its domain.
    pub id: String,
    /// Remote revision, if the backend tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Domain payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Record {
    /// Create an unversioned record.
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            version: None,
            data,
        }
    }

    /// Attach a remote revision.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }
}

/// A local mutation that has not been confirmed by the remote yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeQueueEntry {
    /// Queue-assigned identifier.
    pub id: EntryId,
    /// Domain the change belongs to.
    pub domain: Domain,
    /// What happened locally.
    pub operation: ChangeOperation,
    /// Opaque change payload.
    pub payload: serde_json::Value,
    /// When the change was queued.
    pub enqueued_at: Timestamp,
    /// Failed push attempts so far.
    pub attempts: u32,
    /// When the last failed attempt happened.
    pub last_attempt_at: Option<Timestamp>,
    /// Earliest time the next push may be attempted.
    pub next_attempt_at: Option<Timestamp>,
    /// Error reported by the last failed attempt.
    pub last_error: Option<String>,
}

impl ChangeQueueEntry {
    /// Whether the entry's retry backoff has elapsed at `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.next_attempt_at.map_or(true, |at| now >= at)
    }
}

/// A change notification from the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChangeEvent {
    /// Domain the record belongs to.
    pub domain: Domain,
    /// What happened remotely.
    pub change_type: ChangeType,
    /// The changed record (for deletes, at least its id).
    pub record: Record,
    /// When the notification arrived.
    pub received_at: Timestamp,
}

impl RemoteChangeEvent {
    /// Create an event stamped with the current time.
    pub fn new(domain: Domain, change_type: ChangeType, record: Record) -> Self {
        Self {
            domain,
            change_type,
            record,
            received_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_parses() {
        assert_eq!(
            "delete".parse::<ChangeOperation>().unwrap(),
            ChangeOperation::Delete
        );
        assert!("upsert".parse::<ChangeOperation>().is_err());
    }

    #[test]
    fn record_version_is_optional_on_the_wire() {
        let record: Record = serde_json::from_value(json!({"id": "g1"})).unwrap();
        assert_eq!(record.id, "g1");
        assert_eq!(record.version, None);
        assert_eq!(record.data, serde_json::Value::Null);
    }

    #[test]
    fn entry_is_due_once_backoff_elapses() {
        let mut entry = ChangeQueueEntry {
            id: EntryId::new(),
            domain: Domain::Runes,
            operation: ChangeOperation::Update,
            payload: json!({}),
            enqueued_at: Timestamp::from_millis(1),
            attempts: 0,
            last_attempt_at: None,
            next_attempt_at: None,
            last_error: None,
        };
        assert!(entry.is_due(Timestamp::from_millis(1)));

        entry.attempts = 1;
        entry.last_attempt_at = Some(Timestamp::from_millis(100));
        entry.next_attempt_at = Some(Timestamp::from_millis(600));
        assert!(!entry.is_due(Timestamp::from_millis(599)));
        assert!(entry.is_due(Timestamp::from_millis(600)));
    }

    #[test]
    fn remote_event_is_stamped() {
        let event = RemoteChangeEvent::new(
            Domain::Goals,
            ChangeType::Update,
            Record::new("g1", json!({"v": 2})).with_version(2),
        );
        assert!(event.received_at.as_millis() > 0);
        assert_eq!(event.record.version, Some(2));
    }
}
