//! Shared record identity and sync metadata

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Stable identity key shared by the local and remote copy of a record.
///
/// New ids are UUID v7 strings, so independently created records never
/// collide. Ids received from elsewhere are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new unique id using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("record id cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Sync bookkeeping carried by every entity.
///
/// All instants are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: RecordId,
    pub created_at: i64,
    pub updated_at: i64,
    /// Set while the local copy holds a write the remote has not confirmed.
    /// Never part of a remote document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stained_at: Option<i64>,
    /// Soft-delete marker
    #[serde(default)]
    pub stashed_at: Option<i64>,
}

impl RecordMeta {
    /// Fresh metadata with a new id, created and updated at `now`
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self {
            id: RecordId::new(),
            created_at: now,
            updated_at: now,
            stained_at: None,
            stashed_at: None,
        }
    }

    pub const fn is_stained(&self) -> bool {
        self.stained_at.is_some()
    }

    pub const fn is_stashed(&self) -> bool {
        self.stashed_at.is_some()
    }

    /// Advance `updated_at` to `now` without ever moving it backwards.
    pub fn touch(&mut self, now: i64) {
        self.updated_at = self.updated_at.max(now);
    }
}

/// The entity classes kept in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Team,
    User,
    Event,
    Attendance,
    Lineup,
    MatchEvent,
    Broadcast,
    BroadcastStatus,
    Notification,
}

impl EntityKind {
    /// Every kind, parents before children.
    pub const ALL: [Self; 9] = [
        Self::Team,
        Self::User,
        Self::Event,
        Self::Attendance,
        Self::Lineup,
        Self::MatchEvent,
        Self::Broadcast,
        Self::BroadcastStatus,
        Self::Notification,
    ];

    /// Local table name
    pub const fn table(self) -> &'static str {
        match self {
            Self::Team => "teams",
            Self::User => "users",
            Self::Event => "events",
            Self::Attendance => "attendances",
            Self::Lineup => "lineups",
            Self::MatchEvent => "match_events",
            Self::Broadcast => "broadcasts",
            Self::BroadcastStatus => "broadcast_statuses",
            Self::Notification => "notifications",
        }
    }

    /// Remote collection name. Broadcast statuses live under their broadcast.
    pub const fn collection(self) -> &'static str {
        match self {
            Self::BroadcastStatus => "statuses",
            other => other.table(),
        }
    }

    /// Owning kind for sub-collections
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::BroadcastStatus => Some(Self::Broadcast),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// An entity that lives in both the local and the remote store.
pub trait SyncedRecord:
    fmt::Debug + Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const KIND: EntityKind;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn id(&self) -> &RecordId {
        &self.meta().id
    }

    /// Ordering used when a collection is presented to callers.
    fn display_order(a: &Self, b: &Self) -> Ordering {
        newest_first(a.meta(), b.meta())
    }

    /// Copy of this record as the remote should see it.
    #[must_use]
    fn for_remote(&self) -> Self {
        let mut record = self.clone();
        record.meta_mut().stained_at = None;
        record
    }
}

/// `updated_at` descending, then id ascending.
pub fn newest_first(a: &RecordMeta, b: &RecordMeta) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// `created_at` descending, then id ascending.
pub fn recently_created_first(a: &RecordMeta, b: &RecordMeta) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}
