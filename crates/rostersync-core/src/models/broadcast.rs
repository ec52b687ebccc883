//! Broadcasts, per-recipient delivery status, and notifications

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::{recently_created_first, synced_record, EntityKind, RecordId, RecordMeta};
use crate::util::now_millis;

/// A message sent by a coach to the whole team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub team_id: RecordId,
    #[serde(default)]
    pub author_id: Option<RecordId>,
    pub title: String,
    pub body: String,
}

impl Broadcast {
    #[must_use]
    pub fn new(team_id: RecordId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(now_millis()),
            team_id,
            author_id: None,
            title: title.into(),
            body: body.into(),
        }
    }
}

fn broadcast_order(a: &Broadcast, b: &Broadcast) -> Ordering {
    recently_created_first(&a.meta, &b.meta)
}

synced_record!(Broadcast, EntityKind::Broadcast, order = broadcast_order);

/// Delivery state of one broadcast for one recipient.
///
/// Stored remotely under `broadcasts/{broadcast_id}/statuses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastStatus {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub broadcast_id: RecordId,
    pub user_id: RecordId,
    #[serde(default)]
    pub delivered_at: Option<i64>,
    #[serde(default)]
    pub read_at: Option<i64>,
}

impl BroadcastStatus {
    #[must_use]
    pub fn new(broadcast_id: RecordId, user_id: RecordId) -> Self {
        Self {
            meta: RecordMeta::new(now_millis()),
            broadcast_id,
            user_id,
            delivered_at: None,
            read_at: None,
        }
    }

    pub const fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

synced_record!(BroadcastStatus, EntityKind::BroadcastStatus);

/// An in-app notification for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub user_id: RecordId,
    #[serde(default)]
    pub team_id: Option<RecordId>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub read_at: Option<i64>,
}

impl Notification {
    #[must_use]
    pub fn new(user_id: RecordId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(now_millis()),
            user_id,
            team_id: None,
            title: title.into(),
            body: body.into(),
            read_at: None,
        }
    }
}

fn notification_order(a: &Notification, b: &Notification) -> Ordering {
    recently_created_first(&a.meta, &b.meta)
}

synced_record!(Notification, EntityKind::Notification, order = notification_order);
