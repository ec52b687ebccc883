//! Data models for rostersync

/// Implements [`SyncedRecord`] for a struct with a `meta: RecordMeta` field.
macro_rules! synced_record {
    ($ty:ty, $kind:expr) => {
        impl $crate::models::SyncedRecord for $ty {
            const KIND: $crate::models::EntityKind = $kind;

            fn meta(&self) -> &$crate::models::RecordMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::models::RecordMeta {
                &mut self.meta
            }
        }
    };
    ($ty:ty, $kind:expr, order = $order:path) => {
        impl $crate::models::SyncedRecord for $ty {
            const KIND: $crate::models::EntityKind = $kind;

            fn meta(&self) -> &$crate::models::RecordMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::models::RecordMeta {
                &mut self.meta
            }

            fn display_order(a: &Self, b: &Self) -> std::cmp::Ordering {
                $order(a, b)
            }
        }
    };
}

pub(crate) use synced_record;

mod broadcast;
mod event;
mod record;
mod team;

pub use broadcast::{Broadcast, BroadcastStatus, Notification};
pub use event::{Attendance, AttendanceStatus, Event, EventKind, Lineup, LineupSlot, MatchEvent};
pub use record::{
    newest_first, recently_created_first, EntityKind, RecordId, RecordMeta, SyncedRecord,
};
pub use team::{Team, User};
