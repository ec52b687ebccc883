//! Recency tracking for local edits.
//!
//! The guard remembers, per record id, the last instant the local side wrote
//! it. While an id is inside its window, remote-origin data for it is not
//! allowed to replace the local copy. The map lives for the process only.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::clock::{Clock, SystemClock};
use crate::models::RecordId;

/// Default protection window after a local edit
pub const DEFAULT_EDIT_WINDOW: Duration = Duration::from_secs(8);

#[derive(Debug)]
pub struct EditGuard {
    edits: RwLock<HashMap<RecordId, i64>>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl EditGuard {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_window(clock, DEFAULT_EDIT_WINDOW)
    }

    pub fn with_window(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            edits: RwLock::new(HashMap::new()),
            clock,
            window,
        }
    }

    /// Guard on the wall clock with the default window
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Record a local edit of `id` now
    pub fn mark_edited(&self, id: &RecordId) {
        self.mark_edited_at(id, self.now_millis());
    }

    pub fn mark_edited_at(&self, id: &RecordId, at: i64) {
        let mut edits = self.edits.write().unwrap_or_else(PoisonError::into_inner);
        let entry = edits.entry(id.clone()).or_insert(at);
        *entry = (*entry).max(at);
    }

    /// Whether `id` was edited locally within the default window
    pub fn was_recently_edited(&self, id: &RecordId) -> bool {
        self.was_edited_within(id, self.window)
    }

    /// Whether `id` was edited locally within `window`. The window includes
    /// the edit instant and excludes its end.
    pub fn was_edited_within(&self, id: &RecordId, window: Duration) -> bool {
        let edits = self.edits.read().unwrap_or_else(PoisonError::into_inner);
        let Some(&at) = edits.get(id) else {
            return false;
        };
        let elapsed = self.now_millis() - at;
        (0..window_millis(window)).contains(&elapsed)
    }

    /// Forget edits whose window has passed, returning how many were dropped
    pub fn prune_expired(&self) -> usize {
        let now = self.now_millis();
        let window = window_millis(self.window);
        let mut edits = self.edits.write().unwrap_or_else(PoisonError::into_inner);
        let before = edits.len();
        edits.retain(|_, at| now - *at < window);
        before - edits.len()
    }

    pub fn len(&self) -> usize {
        self.edits
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn window_millis(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}
