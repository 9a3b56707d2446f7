//! Identity and ordering types for the sync engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::SyncError;

/// A unique identifier for a queued local change.
///
/// UUID v4 format (16 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(uuid::Uuid);

impl EntryId {
    /// Create a new random EntryId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.0)
    }
}

/// Milliseconds since the Unix epoch.
///
/// Used for `enqueuedAt`, `receivedAt` and last-success bookkeeping.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a Timestamp from a millisecond value.
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Get the millisecond value.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed from `earlier` to `self` (zero if `earlier` is later).
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Caller-supplied identity token.
///
/// Every operation that mutates engine state carries one. An empty or
/// whitespace-only token is rejected with [`SyncError::MissingIdentity`]
/// rather than being defaulted.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate and wrap an identity token.
    pub fn new(token: impl Into<String>) -> Result<Self, SyncError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SyncError::MissingIdentity);
        }
        Ok(Self(token))
    }

    /// Build an identity from an optional token, as handed over by a session layer.
    pub fn require(token: Option<&str>) -> Result<Self, SyncError> {
        token.ok_or(SyncError::MissingIdentity).and_then(Self::new)
    }

    /// The raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_is_uuid_v4() {
        let id = EntryId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn entry_id_parses_its_display() {
        let id = EntryId::new();
        let parsed: EntryId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn entry_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<EntryId>().is_err());
    }

    #[test]
    fn timestamp_ordering() {
        let t1 = Timestamp::from_millis(100);
        let t2 = Timestamp::from_millis(200);
        assert!(t1 < t2);
        assert_eq!(t2.millis_since(t1), 100);
        assert_eq!(t1.millis_since(t2), 0);
    }

    #[test]
    fn timestamp_now_is_after_epoch() {
        assert!(Timestamp::now().as_millis() > 0);
    }

    #[test]
    fn identity_rejects_blank_tokens() {
        assert!(matches!(Identity::new(""), Err(SyncError::MissingIdentity)));
        assert!(matches!(Identity::new("   "), Err(SyncError::MissingIdentity)));
        assert!(matches!(
            Identity::require(None),
            Err(SyncError::MissingIdentity)
        ));
    }

    #[test]
    fn identity_keeps_token() {
        let identity = Identity::require(Some("user-1")).unwrap();
        assert_eq!(identity.as_str(), "user-1");
    }

    #[test]
    fn identity_deserialize_validates() {
        let ok: Identity = serde_json::from_str("\"user-1\"").unwrap();
        assert_eq!(ok.as_str(), "user-1");
        assert!(serde_json::from_str::<Identity>("\"\"").is_err());
    }
}
