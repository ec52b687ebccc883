//! Event-scoped models: events, attendance, lineups and match events

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::{recently_created_first, synced_record, EntityKind, RecordId, RecordMeta};
use crate::util::now_millis;

/// What kind of gathering an event is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[default]
    Practice,
    Match,
    Meeting,
    Other,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Practice => "practice",
            Self::Match => "match",
            Self::Meeting => "meeting",
            Self::Other => "other",
        }
    }

    /// Parse a stored tag; unknown tags become `Other`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "practice" => Self::Practice,
            "match" => Self::Match,
            "meeting" => Self::Meeting,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled team event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub team_id: RecordId,
    pub title: String,
    #[serde(default)]
    pub kind: EventKind,
    #[serde(default)]
    pub location: Option<String>,
    pub starts_at: i64,
    #[serde(default)]
    pub ends_at: Option<i64>,
}

impl Event {
    #[must_use]
    pub fn new(team_id: RecordId, title: impl Into<String>, starts_at: i64) -> Self {
        Self {
            meta: RecordMeta::new(now_millis()),
            team_id,
            title: title.into(),
            kind: EventKind::default(),
            location: None,
            starts_at,
            ends_at: None,
        }
    }
}

/// Soonest first, then most recently created.
fn event_order(a: &Event, b: &Event) -> Ordering {
    a.starts_at
        .cmp(&b.starts_at)
        .then_with(|| recently_created_first(&a.meta, &b.meta))
}

synced_record!(Event, EntityKind::Event, order = event_order);

/// A member's answer for an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    #[default]
    Unknown,
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Excused => "excused",
        }
    }

    /// Parse a stored tag; unknown tags become `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "present" => Self::Present,
            "absent" => Self::Absent,
            "late" => Self::Late,
            "excused" => Self::Excused,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub event_id: RecordId,
    pub user_id: RecordId,
    #[serde(default)]
    pub status: AttendanceStatus,
    #[serde(default)]
    pub note: Option<String>,
}

impl Attendance {
    #[must_use]
    pub fn new(event_id: RecordId, user_id: RecordId, status: AttendanceStatus) -> Self {
        Self {
            meta: RecordMeta::new(now_millis()),
            event_id,
            user_id,
            status,
            note: None,
        }
    }
}

synced_record!(Attendance, EntityKind::Attendance);

/// One player placed on the formation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineupSlot {
    pub player_id: RecordId,
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineup {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub event_id: RecordId,
    pub formation: String,
    #[serde(default)]
    pub positions: Vec<LineupSlot>,
}

impl Lineup {
    #[must_use]
    pub fn new(event_id: RecordId, formation: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(now_millis()),
            event_id,
            formation: formation.into(),
            positions: Vec::new(),
        }
    }
}

synced_record!(Lineup, EntityKind::Lineup);

/// Something that happened during a match (goal, card, substitution...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub event_id: RecordId,
    #[serde(default)]
    pub player_id: Option<RecordId>,
    pub kind: String,
    pub minute: i64,
    /// Position in the match feed
    pub sequence: i64,
}

impl MatchEvent {
    #[must_use]
    pub fn new(event_id: RecordId, kind: impl Into<String>, minute: i64, sequence: i64) -> Self {
        Self {
            meta: RecordMeta::new(now_millis()),
            event_id,
            player_id: None,
            kind: kind.into(),
            minute,
            sequence,
        }
    }
}

/// Latest in the feed first; equal sequence numbers fall back to insertion time.
fn match_event_order(a: &MatchEvent, b: &MatchEvent) -> Ordering {
    b.sequence
        .cmp(&a.sequence)
        .then_with(|| recently_created_first(&a.meta, &b.meta))
}

synced_record!(MatchEvent, EntityKind::MatchEvent, order = match_event_order);
