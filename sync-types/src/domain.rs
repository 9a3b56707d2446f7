//! Domains, scopes and per-scope sync state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;
use crate::ids::Timestamp;

/// A logical data set kept in sync between the local copy and the remote.
///
/// The set is closed: adding a domain means adding a variant here and
/// binding a transport for it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Knowledge records.
    Knowledge,
    /// User actions and abilities.
    Actions,
    /// Tasks and their steps.
    Tasks,
    /// Runes (agents).
    Runes,
    /// Goals and key results.
    Goals,
    /// Notifications.
    Notifications,
    /// Analytics events.
    Analytics,
}

impl Domain {
    /// Every domain, in canonical sweep order.
    pub const ALL: [Domain; 7] = [
        Domain::Knowledge,
        Domain::Actions,
        Domain::Tasks,
        Domain::Runes,
        Domain::Goals,
        Domain::Notifications,
        Domain::Analytics,
    ];

    /// The identifier used in topics, storage and config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Knowledge => "knowledge",
            Domain::Actions => "actions",
            Domain::Tasks => "tasks",
            Domain::Runes => "runes",
            Domain::Goals => "goals",
            Domain::Notifications => "notifications",
            Domain::Analytics => "analytics",
        }
    }
}

impl FromStr for Domain {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| SyncError::UnknownDomain(s.to_string()))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Domain({})", self.as_str())
    }
}

/// What a status or timestamp is tracked for.
///
/// The aggregate `System` scope lives in its own namespace so that it can
/// never be mistaken for a domain during a sweep.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// A single domain.
    Domain(Domain),
    /// The aggregate over all domains.
    System,
}

impl Scope {
    /// The identifier used in topics and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Domain(d) => d.as_str(),
            Scope::System => "system",
        }
    }

    /// The domain, if this is not the aggregate scope.
    pub fn domain(&self) -> Option<Domain> {
        match self {
            Scope::Domain(d) => Some(*d),
            Scope::System => None,
        }
    }
}

impl From<Domain> for Scope {
    fn from(domain: Domain) -> Self {
        Scope::Domain(domain)
    }
}

impl FromStr for Scope {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "system" {
            Ok(Scope::System)
        } else {
            s.parse().map(Scope::Domain)
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({})", self.as_str())
    }
}

/// Sync status of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Never synced (or reset) in this process.
    #[default]
    Unknown,
    /// Last cycle finished successfully.
    Idle,
    /// A cycle is running.
    Syncing,
    /// Last cycle failed.
    Error,
}

impl SyncStatus {
    /// Lowercase name, as shown to users.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Unknown => "unknown",
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// The scope this state belongs to.
    pub scope: Scope,
    /// Current status.
    pub status: SyncStatus,
    /// Human-readable progress step.
    pub current_step: Option<String>,
    /// When the last successful cycle finished.
    pub last_success: Option<Timestamp>,
}

impl SyncState {
    /// Fresh state for a scope that has never been seen.
    pub fn unknown(scope: Scope) -> Self {
        Self {
            scope,
            status: SyncStatus::Unknown,
            current_step: None,
            last_success: None,
        }
    }
}

/// Which halves of a cycle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Push queued local changes only.
    Up,
    /// Pull remote changes only.
    Down,
    /// Pull, then push.
    #[default]
    Bidirectional,
}

impl Direction {
    /// Whether remote changes are pulled.
    pub fn pulls(&self) -> bool {
        matches!(self, Direction::Down | Direction::Bidirectional)
    }

    /// Whether queued local changes are pushed.
    pub fn pushes(&self) -> bool {
        matches!(self, Direction::Up | Direction::Bidirectional)
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Bidirectional => "bidirectional",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "bidirectional" => Ok(Direction::Bidirectional),
            other => Err(SyncError::Internal(format!("unknown direction: {other}"))),
        }
    }
}
