//! Pure reconciliation rules shared by merged feeds and pull sync

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::guard::EditGuard;
use super::ports::SyncBatch;
use crate::models::{RecordId, SyncedRecord};

/// Comparator used to present a collection
pub type RecordOrder<T> = fn(&T, &T) -> Ordering;

/// Union of two snapshots keyed by id.
///
/// The remote copy replaces the local one on collision, except for ids
/// inside their edit window: those keep whatever the local side has, which
/// also hides a remote copy of a record deleted locally moments ago.
pub fn merge_snapshots<T: SyncedRecord>(
    local: &[T],
    remote: &[T],
    guard: &EditGuard,
    order: RecordOrder<T>,
) -> Vec<T> {
    let mut merged: HashMap<&RecordId, &T> = local.iter().map(|record| (record.id(), record)).collect();
    for record in remote {
        if !guard.was_recently_edited(record.id()) {
            merged.insert(record.id(), record);
        }
    }
    let mut records = merged.into_values().cloned().collect::<Vec<_>>();
    records.sort_by(order);
    records
}

/// Local changes needed to make a scope match a remote pull
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<T> {
    pub batch: SyncBatch<T>,
    /// Ids left alone because they were edited locally within the window
    pub skipped_guarded: usize,
}

/// Plan the local writes that adopt `remote` for the scope `local` covers.
///
/// Remote records replace differing local ones; local records missing
/// remotely are deleted unless they still carry an unconfirmed write.
/// Guarded ids are untouched in both directions.
pub fn reconcile<T: SyncedRecord>(local: &[T], remote: Vec<T>, guard: &EditGuard) -> Reconciliation<T> {
    reconcile_with(local, remote, &|id| guard.was_recently_edited(id))
}

/// [`reconcile`] with the guard check supplied by the caller, so a store
/// can take the decision while it holds its write lock.
pub fn reconcile_with<T: SyncedRecord>(
    local: &[T],
    remote: Vec<T>,
    keep_local: &dyn Fn(&RecordId) -> bool,
) -> Reconciliation<T> {
    let existing: HashMap<&RecordId, &T> = local.iter().map(|record| (record.id(), record)).collect();
    let remote_ids: HashSet<RecordId> = remote.iter().map(|record| record.id().clone()).collect();
    let mut batch = SyncBatch::new();
    let mut skipped_guarded = 0;

    for record in remote {
        if keep_local(record.id()) {
            skipped_guarded += 1;
            continue;
        }
        let unchanged = existing
            .get(record.id())
            .is_some_and(|current| **current == record);
        if !unchanged {
            batch.upserts.push(record);
        }
    }

    for record in local {
        if remote_ids.contains(record.id()) || record.meta().is_stained() {
            continue;
        }
        if keep_local(record.id()) {
            skipped_guarded += 1;
            continue;
        }
        batch.deletes.push(record.id().clone());
    }

    Reconciliation {
        batch,
        skipped_guarded,
    }
}
