//! One entity, two stores.
//!
//! [`CombinedRepository`] routes reads to the local store, fans writes out
//! to both, merges live views and pulls the remote scope into the local
//! store. Local writes are authoritative for the caller: a remote failure
//! leaves the record staged for the next [`sync`](CombinedRepository::sync)
//! instead of failing the write.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::guard::EditGuard;
use super::merge::{merge_snapshots, RecordOrder};
use super::ports::{LocalObservation, LocalStore, RemoteStore};
use crate::error::Result;
use crate::filter::Filter;
use crate::models::{RecordId, SyncedRecord};
use crate::state::FeedStatus;

/// What happened to the remote half of a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Synced,
    /// Committed locally; the remote write failed and will be retried by
    /// the next sync
    PendingRemote { reason: String },
}

impl WriteOutcome {
    pub const fn is_synced(&self) -> bool {
        matches!(self, Self::Synced)
    }
}

/// A committed local write and the state of its remote copy
#[derive(Debug, Clone, PartialEq)]
pub struct Written<T> {
    /// The record as now stored locally
    pub record: T,
    pub outcome: WriteOutcome,
}

/// Counts from one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Staged records confirmed by the remote
    pub pushed: usize,
    pub push_failed: usize,
    /// Records received from the remote
    pub pulled: usize,
    /// Local rows written from remote data
    pub applied: usize,
    /// Local rows deleted because the remote no longer has them
    pub removed: usize,
    /// Ids left alone because of a recent local edit
    pub skipped_guarded: usize,
}

impl SyncReport {
    pub fn absorb(&mut self, other: Self) {
        self.pushed += other.pushed;
        self.push_failed += other.push_failed;
        self.pulled += other.pulled;
        self.applied += other.applied;
        self.removed += other.removed;
        self.skipped_guarded += other.skipped_guarded;
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pushed {} (failed {}), pulled {}, applied {}, removed {}, guarded {}",
            self.pushed,
            self.push_failed,
            self.pulled,
            self.applied,
            self.removed,
            self.skipped_guarded
        )
    }
}

/// Local and remote store for one entity behind one interface
pub struct CombinedRepository<T, L, R> {
    local: Arc<L>,
    remote: Arc<R>,
    guard: Arc<EditGuard>,
    scope: Filter,
    order: RecordOrder<T>,
}

impl<T, L, R> Clone for CombinedRepository<T, L, R> {
    fn clone(&self) -> Self {
        Self {
            local: Arc::clone(&self.local),
            remote: Arc::clone(&self.remote),
            guard: Arc::clone(&self.guard),
            scope: self.scope.clone(),
            order: self.order,
        }
    }
}

impl<T, L, R> fmt::Debug for CombinedRepository<T, L, R>
where
    T: SyncedRecord,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedRepository")
            .field("kind", &T::KIND)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl<T, L, R> CombinedRepository<T, L, R>
where
    T: SyncedRecord,
    L: LocalStore<T> + 'static,
    R: RemoteStore<T> + 'static,
{
    pub fn new(local: Arc<L>, remote: Arc<R>, guard: Arc<EditGuard>) -> Self {
        Self {
            local,
            remote,
            guard,
            scope: Filter::all(),
            order: T::display_order,
        }
    }

    /// Restrict every read, sync and bulk delete to `scope`
    #[must_use]
    pub fn with_scope(mut self, scope: Filter) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn with_ordering(mut self, order: RecordOrder<T>) -> Self {
        self.order = order;
        self
    }

    pub const fn scope(&self) -> &Filter {
        &self.scope
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn guard(&self) -> &EditGuard {
        &self.guard
    }

    fn scoped(&self, filter: Filter) -> Filter {
        self.scope.clone().and(filter)
    }

    /// Point read: local first, then a one-shot remote lookup whose hit is
    /// cached locally.
    pub async fn get(&self, id: &RecordId) -> Option<T> {
        match self.local.get_by_id(id).await {
            Ok(Some(record)) => return Some(record),
            Ok(None) => {}
            Err(error) => tracing::warn!("Local read of {} {id} failed: {error}", T::KIND),
        }
        // A guarded id missing locally was deleted here moments ago
        if self.guard.was_recently_edited(id) {
            return None;
        }

        let record = match self.remote.fetch_once(&Filter::by_id(id)).await {
            Ok(records) => records.into_iter().next()?,
            Err(error) => {
                tracing::warn!("Remote read of {} {id} failed: {error}", T::KIND);
                return None;
            }
        };
        if let Err(error) = self.local.upsert(&record).await {
            tracing::warn!("Caching {} {id} locally failed: {error}", T::KIND);
        }
        Some(record)
    }

    /// One-shot local query within the scope
    pub async fn list(&self, filter: Filter) -> Vec<T> {
        let mut records = self
            .local
            .fetch(&self.scoped(filter))
            .await
            .unwrap_or_else(|error| {
                tracing::warn!("Local query of {} failed: {error}", T::KIND);
                Vec::new()
            });
        records.sort_by(self.order);
        records
    }

    /// Live local results. A background sync is started alongside.
    pub async fn observe(&self, filter: Filter) -> Result<LocalObservation<T>> {
        let observation = self.local.observe_all(self.scoped(filter)).await?;
        let repository = self.clone();
        tokio::spawn(async move {
            if let Err(error) = repository.sync().await {
                tracing::warn!("Background sync of {} failed: {error}", T::KIND);
            }
        });
        Ok(observation)
    }

    /// Live union of local and remote results.
    ///
    /// The remote copy wins on id collision unless the id was edited locally
    /// within the guard window. The feed survives remote failure and keeps
    /// serving local data.
    pub async fn observe_merged(&self, filter: Filter) -> Result<MergedFeed<T>> {
        let scope = self.scoped(filter);
        let mut local = self.local.observe_all(scope.clone()).await?;
        let mut remote = self.remote.observe(scope);

        let mut local_latest = local.next().await.unwrap_or_default();
        local_latest.sort_by(self.order);
        let (records_tx, records_rx) = watch::channel(local_latest.clone());
        let (status_tx, status_rx) = watch::channel(FeedStatus::Connecting);
        let guard = Arc::clone(&self.guard);
        let order = self.order;

        tokio::spawn(async move {
            let mut remote_latest: Vec<T> = Vec::new();
            let mut remote_open = true;
            loop {
                tokio::select! {
                    () = records_tx.closed() => break,
                    update = local.next() => match update {
                        Some(records) => local_latest = records,
                        None => break,
                    },
                    update = remote.next(), if remote_open => {
                        let status = match update {
                            Some(Ok(records)) => {
                                remote_latest = records;
                                FeedStatus::Live
                            }
                            Some(Err(error)) => {
                                tracing::warn!("Remote feed of {} failed: {error}", T::KIND);
                                remote_open = false;
                                remote_latest.clear();
                                FeedStatus::RemoteFailed(error.to_string())
                            }
                            None => {
                                remote_open = false;
                                FeedStatus::RemoteClosed
                            }
                        };
                        status_tx.send_if_modified(|current| replace_if_changed(current, status));
                    },
                }

                let merged = merge_snapshots(&local_latest, &remote_latest, &guard, order);
                records_tx.send_if_modified(|current| replace_if_changed(current, merged));
            }
            tracing::debug!("Merged feed of {} stopped", T::KIND);
        });

        Ok(MergedFeed {
            records: records_rx,
            status: status_rx,
        })
    }

    /// Mark the id as edited, write locally, then push.
    ///
    /// `created_at` is kept from the stored copy and `updated_at` moves
    /// strictly forward past it, so every write of an id carries its own
    /// `(stained_at, updated_at)` pair and a late push confirmation cannot
    /// clear the stain of a newer write.
    pub async fn upsert(&self, mut record: T) -> Result<Written<T>> {
        let now = self.guard.now_millis();
        if let Some(stored) = self.local.get_by_id(record.id()).await? {
            let meta = record.meta_mut();
            meta.created_at = stored.meta().created_at;
            meta.updated_at = meta.updated_at.max(stored.meta().updated_at + 1);
        }
        record.meta_mut().stained_at = Some(now);

        // Marked first so a concurrent pull already sees the id as guarded
        self.guard.mark_edited(record.id());
        self.local.upsert(&record).await?;
        tracing::debug!("Stored {} {} locally", T::KIND, record.id());

        let outcome = self.push(&record).await;
        if outcome.is_synced() {
            record.meta_mut().stained_at = None;
        }
        Ok(Written { record, outcome })
    }

    /// Soft delete through the regular write path
    pub async fn stash(&self, mut record: T) -> Result<Written<T>> {
        let now = self.guard.now_millis();
        let meta = record.meta_mut();
        meta.stashed_at = Some(now);
        meta.touch(now);
        self.upsert(record).await
    }

    /// Physically delete locally, then best-effort remotely
    pub async fn delete(&self, id: &RecordId) -> Result<WriteOutcome> {
        self.guard.mark_edited(id);
        self.local.delete(id).await?;
        Ok(match self.remote.delete(id).await {
            Ok(()) => WriteOutcome::Synced,
            Err(error) => {
                tracing::warn!("Remote delete of {} {id} failed: {error}", T::KIND);
                WriteOutcome::PendingRemote {
                    reason: error.to_string(),
                }
            }
        })
    }

    /// Empty the scope locally; remote deletion is best effort.
    pub async fn delete_all(&self) -> Result<usize> {
        let removed = self.local.delete_matching(&self.scope).await?;
        match self.remote.delete_all(&self.scope).await {
            Ok(remote_removed) => {
                tracing::debug!("Deleted {remote_removed} remote {} documents", T::KIND);
            }
            Err(error) => {
                tracing::warn!("Remote delete-all of {} failed: {error}", T::KIND);
            }
        }
        Ok(removed)
    }

    /// Push staged records, then pull the remote scope into the local store.
    ///
    /// Fails only when the pull or a local step fails.
    pub async fn sync(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let staged = self.local.fetch(&self.scoped(Filter::staged())).await?;
        for record in &staged {
            if self.push(record).await.is_synced() {
                report.pushed += 1;
            } else {
                report.push_failed += 1;
            }
        }

        let remote = self.remote.fetch_once(&self.scope).await?;
        report.pulled = remote.len();
        report.absorb(self.adopt(remote).await?);

        tracing::info!("Synced {}: {report}", T::KIND);
        Ok(report)
    }

    /// Apply every remote snapshot of `filter` to the local store until the
    /// subscription ends or the handle is dropped.
    pub fn mirror_remote(&self, filter: Filter) -> MirrorHandle {
        let mut subscription = self.remote.observe(self.scoped(filter.clone()));
        let repository = self.clone().with_scope(self.scoped(filter));
        let task = tokio::spawn(async move {
            while let Some(update) = subscription.next().await {
                match update {
                    Ok(records) => match repository.adopt(records).await {
                        Ok(applied) => tracing::debug!("Mirrored {}: {applied}", T::KIND),
                        Err(error) => {
                            tracing::warn!("Mirroring {} locally failed: {error}", T::KIND);
                        }
                    },
                    Err(error) => {
                        tracing::warn!("Remote mirror of {} ended: {error}", T::KIND);
                    }
                }
            }
        });
        MirrorHandle { task: Some(task) }
    }

    /// Make the local scope match `remote`, respecting the guard
    async fn adopt(&self, remote: Vec<T>) -> Result<SyncReport> {
        let guard = &self.guard;
        let plan = self
            .local
            .apply_remote(&self.scope, remote, &|id| guard.was_recently_edited(id))
            .await?;
        Ok(SyncReport {
            applied: plan.batch.upserts.len(),
            removed: plan.batch.deletes.len(),
            skipped_guarded: plan.skipped_guarded,
            ..SyncReport::default()
        })
    }

    async fn push(&self, record: &T) -> WriteOutcome {
        match self.remote.save(&record.for_remote()).await {
            Ok(()) => {
                if let Err(error) = self.local.clear_stain(record.meta()).await {
                    tracing::warn!(
                        "Clearing stain of {} {} failed: {error}",
                        T::KIND,
                        record.id()
                    );
                }
                WriteOutcome::Synced
            }
            Err(error) => {
                tracing::warn!(
                    "Remote save of {} {} failed, kept staged: {error}",
                    T::KIND,
                    record.id()
                );
                WriteOutcome::PendingRemote {
                    reason: error.to_string(),
                }
            }
        }
    }
}

fn replace_if_changed<V: PartialEq>(current: &mut V, next: V) -> bool {
    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}

/// Receivers of a merged feed. Dropping it stops the merge task.
#[derive(Debug)]
pub struct MergedFeed<T> {
    records: watch::Receiver<Vec<T>>,
    status: watch::Receiver<FeedStatus>,
}

impl<T: Clone> MergedFeed<T> {
    pub fn current(&self) -> Vec<T> {
        self.records.borrow().clone()
    }

    pub fn status(&self) -> FeedStatus {
        self.status.borrow().clone()
    }

    /// Next published result, or `None` once the feed has stopped
    pub async fn changed(&mut self) -> Option<Vec<T>> {
        self.records.changed().await.ok()?;
        Some(self.records.borrow_and_update().clone())
    }

    /// Wait until the published result satisfies `predicate`
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&[T]) -> bool) -> Option<Vec<T>> {
        let records = self
            .records
            .wait_for(|records| predicate(records))
            .await
            .ok()?;
        Some(records.clone())
    }

    pub async fn wait_for_status(
        &mut self,
        mut predicate: impl FnMut(&FeedStatus) -> bool,
    ) -> Option<FeedStatus> {
        let status = self.status.wait_for(|status| predicate(status)).await.ok()?;
        Some(status.clone())
    }

    pub fn records_receiver(&self) -> watch::Receiver<Vec<T>> {
        self.records.clone()
    }
}

/// Background remote-to-local mirror; aborted when dropped
#[derive(Debug)]
pub struct MirrorHandle {
    task: Option<JoinHandle<()>>,
}

impl MirrorHandle {
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the mirror to end on its own
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            task.await.ok();
        }
    }
}

impl Drop for MirrorHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteLocalStore};
    use crate::models::{Event, Team};
    use crate::remote::MemoryRemoteStore;
    use crate::sync::clock::ManualClock;
    use pretty_assertions::assert_eq;
    use crate::models::RecordMeta;
    use crate::sync::{Reconciliation, SyncBatch};
    use std::future::Future;
    use std::time::Duration;
    use tokio::sync::Notify;

    const T0: i64 = 1_700_000_000_000;

    type Repo<T> = CombinedRepository<T, SqliteLocalStore<T>, MemoryRemoteStore<T>>;

    struct Fixture<T> {
        clock: Arc<ManualClock>,
        remote: MemoryRemoteStore<T>,
        repo: Repo<T>,
    }

    fn fixture<T: crate::db::TableRecord>() -> Fixture<T> {
        let clock = Arc::new(ManualClock::new(T0));
        let guard = Arc::new(EditGuard::new(clock.clone()));
        let local = Arc::new(SqliteLocalStore::new(Database::open_in_memory().unwrap()));
        let remote = MemoryRemoteStore::new();
        let repo = CombinedRepository::new(local, Arc::new(remote.clone()), guard);
        Fixture {
            clock,
            remote,
            repo,
        }
    }

    async fn within<F: Future>(future: F) -> F::Output {
        tokio::time::timeout(Duration::from_secs(5), future)
            .await
            .expect("timed out")
    }

    fn named(team: &Team, name: &str) -> Team {
        let mut copy = team.clone();
        copy.name = name.into();
        copy
    }

    fn name_of(records: &[Team], id: &RecordId) -> Option<String> {
        records
            .iter()
            .find(|record| record.id() == id)
            .map(|record| record.name.clone())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_read_your_write() {
        let fx = fixture::<Team>();
        let written = fx.repo.upsert(Team::new("Falcons", "football")).await.unwrap();
        assert_eq!(written.outcome, WriteOutcome::Synced);
        assert_eq!(written.record.meta.stained_at, None);

        let read = fx.repo.get(written.record.id()).await.unwrap();
        assert_eq!(read, written.record);
        assert_eq!(fx.remote.get(read.id()), Some(read));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_write_stays_staged_until_sync() {
        let fx = fixture::<Team>();
        fx.remote.set_offline(true);
        let written = fx.repo.upsert(Team::new("Falcons", "football")).await.unwrap();
        assert!(matches!(written.outcome, WriteOutcome::PendingRemote { .. }));
        assert_eq!(written.record.meta.stained_at, Some(T0));
        assert!(fx.remote.is_empty());

        let staged = fx.repo.list(Filter::staged()).await;
        assert_eq!(staged, vec![written.record.clone()]);

        assert!(fx.repo.sync().await.is_err());

        fx.remote.set_offline(false);
        let report = fx.repo.sync().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.pulled, 1);
        assert!(fx.repo.list(Filter::staged()).await.is_empty());
        assert_eq!(fx.remote.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_clamps_timestamps_to_stored_copy() {
        let fx = fixture::<Team>();
        let mut team = Team::new("Falcons", "football");
        team.meta.created_at = 100;
        team.meta.updated_at = 500;
        fx.repo.upsert(team.clone()).await.unwrap();

        let mut older = named(&team, "Renamed");
        older.meta.created_at = 900;
        older.meta.updated_at = 200;
        let written = fx.repo.upsert(older).await.unwrap();
        assert_eq!(written.record.meta.created_at, 100);
        assert_eq!(written.record.meta.updated_at, 501);
        assert_eq!(written.record.name, "Renamed");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_late_confirmation_keeps_newer_write_staged() {
        let fx = fixture::<Team>();
        fx.remote.set_offline(true);
        let first = fx.repo.upsert(Team::new("First", "football")).await.unwrap();
        // Same clock millisecond as the first write
        let second = fx
            .repo
            .upsert(named(&first.record, "Second"))
            .await
            .unwrap();
        assert_eq!(first.record.meta.stained_at, second.record.meta.stained_at);
        assert!(second.record.meta.updated_at > first.record.meta.updated_at);

        // The first write's push only now reaches the remote
        fx.remote.set_offline(false);
        assert!(fx.repo.push(&first.record).await.is_synced());

        let stored = fx.repo.get(first.record.id()).await.unwrap();
        assert_eq!(stored.name, "Second");
        assert_eq!(stored.meta.stained_at, Some(T0));
        assert_eq!(fx.repo.list(Filter::staged()).await, vec![stored]);

        let report = fx.repo.sync().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(fx.remote.get(first.record.id()).unwrap().name, "Second");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_converges_to_remote_outside_guard_window() {
        let fx = fixture::<Team>();
        let kept = fx.repo.upsert(Team::new("Kept", "rugby")).await.unwrap().record;
        let dropped = fx.repo.upsert(Team::new("Dropped", "rugby")).await.unwrap().record;
        fx.clock.advance(60_000);

        // Another client edits one team, deletes the other and adds a third
        fx.remote.put(named(&kept, "Kept v2"));
        fx.remote.remove(dropped.id());
        fx.remote.put(Team::new("Added", "rugby"));

        let report = fx.repo.sync().await.unwrap();
        assert_eq!(report.pulled, 2);
        assert_eq!(report.applied, 2);
        assert_eq!(report.removed, 1);
        assert_eq!(report.skipped_guarded, 0);
        assert_eq!(fx.repo.list(Filter::all()).await, fx.remote.documents());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_respects_guard_window() {
        let fx = fixture::<Team>();
        let mine = fx.repo.upsert(Team::new("Mine", "hockey")).await.unwrap().record;
        fx.remote.put(named(&mine, "Theirs"));

        let report = fx.repo.sync().await.unwrap();
        assert_eq!(report.skipped_guarded, 1);
        assert_eq!(fx.repo.get(mine.id()).await.unwrap().name, "Mine");

        fx.clock.advance(8_000);
        let report = fx.repo.sync().await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(fx.repo.get(mine.id()).await.unwrap().name, "Theirs");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_pull_fails_sync_and_keeps_staged_record() {
        let fx = fixture::<Team>();
        fx.remote.set_offline(true);
        let staged = fx.repo.upsert(Team::new("Offline", "hockey")).await.unwrap().record;
        fx.clock.advance(60_000);
        fx.remote.set_offline(false);
        fx.remote.fail_permanently("write access revoked");

        assert!(fx.repo.sync().await.is_err());
        assert_eq!(fx.repo.list(Filter::all()).await, vec![staged]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_all_empties_local_when_remote_fails() {
        let fx = fixture::<Team>();
        fx.repo.upsert(Team::new("A", "rugby")).await.unwrap();
        fx.repo.upsert(Team::new("B", "rugby")).await.unwrap();
        fx.remote.fail_permanently("remote unavailable");

        assert_eq!(fx.repo.delete_all().await.unwrap(), 2);
        assert!(fx.repo.list(Filter::all()).await.is_empty());
        assert_eq!(fx.remote.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_falls_back_to_remote_and_caches() {
        let fx = fixture::<Team>();
        let theirs = Team::new("Remote only", "netball");
        fx.remote.put(theirs.clone());

        assert_eq!(fx.repo.get(theirs.id()).await, Some(theirs.clone()));
        assert_eq!(
            fx.repo.local().get_by_id(theirs.id()).await.unwrap(),
            Some(theirs)
        );
        assert_eq!(fx.repo.get(&RecordId::from("missing")).await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_recent_local_delete_hides_remote_copy() {
        let fx = fixture::<Team>();
        let team = fx.repo.upsert(Team::new("Gone", "rugby")).await.unwrap().record;
        fx.remote.set_offline(true);
        let outcome = fx.repo.delete(team.id()).await.unwrap();
        assert!(!outcome.is_synced());
        fx.remote.set_offline(false);

        assert_eq!(fx.repo.get(team.id()).await, None);
        assert!(fx.remote.get(team.id()).is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stash_is_a_soft_delete() {
        let fx = fixture::<Team>();
        let team = fx.repo.upsert(Team::new("Old", "rugby")).await.unwrap().record;
        let stashed = fx.repo.stash(team).await.unwrap();
        assert!(stashed.outcome.is_synced());
        assert!(stashed.record.meta.is_stashed());

        assert!(fx.repo.list(Filter::live()).await.is_empty());
        assert_eq!(fx.repo.list(Filter::all()).await.len(), 1);
        assert!(fx.remote.documents()[0].meta.is_stashed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_merged_feed_keeps_local_edit_inside_window() {
        let fx = fixture::<Team>();
        let mut feed = fx.repo.observe_merged(Filter::all()).await.unwrap();
        within(feed.wait_for_status(FeedStatus::is_live)).await.unwrap();

        let mine = fx.repo.upsert(Team::new("Local v1", "hockey")).await.unwrap().record;
        let id = mine.id().clone();
        within(feed.wait_for(|records| name_of(records, &id).as_deref() == Some("Local v1")))
            .await
            .unwrap();

        // A delayed echo of an older version arrives 3 seconds later
        fx.clock.advance(3_000);
        fx.remote.put(named(&mine, "Stale"));
        let marker = Team::new("Marker 1", "hockey");
        let marker_id = marker.id().clone();
        fx.remote.put(marker);
        let records = within(feed.wait_for(|records| name_of(records, &marker_id).is_some()))
            .await
            .unwrap();
        assert_eq!(name_of(&records, &id).as_deref(), Some("Local v1"));

        // Once the window has passed the remote copy is adopted
        fx.clock.advance(7_000);
        let marker = Team::new("Marker 2", "hockey");
        let marker_id = marker.id().clone();
        fx.remote.put(marker);
        let records = within(feed.wait_for(|records| name_of(records, &marker_id).is_some()))
            .await
            .unwrap();
        assert_eq!(name_of(&records, &id).as_deref(), Some("Stale"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_merged_feed_survives_remote_failure() {
        let fx = fixture::<Team>();
        let mut feed = fx.repo.observe_merged(Filter::all()).await.unwrap();
        fx.remote.fail_permanently("permission denied");
        let status = within(feed.wait_for_status(FeedStatus::is_terminal))
            .await
            .unwrap();
        assert!(matches!(status, FeedStatus::RemoteFailed(_)));

        let written = fx.repo.upsert(Team::new("Offline", "rugby")).await.unwrap();
        assert!(!written.outcome.is_synced());
        let id = written.record.id().clone();
        let records = within(feed.wait_for(|records| name_of(records, &id).is_some()))
            .await
            .unwrap();
        assert_eq!(records, vec![written.record]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_upserts_on_distinct_ids() {
        let fx = fixture::<Team>();
        let tasks = (0..16)
            .map(|index| {
                let repo = fx.repo.clone();
                tokio::spawn(async move {
                    repo.upsert(Team::new(format!("Team {index}"), "rugby"))
                        .await
                        .unwrap()
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            assert!(task.await.unwrap().outcome.is_synced());
        }
        assert_eq!(fx.repo.list(Filter::all()).await.len(), 16);
        assert_eq!(fx.remote.len(), 16);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mirror_remote_applies_pushes() {
        let fx = fixture::<Team>();
        let mut local = fx.repo.local().observe_all(Filter::all()).await.unwrap();
        let mirror = fx.repo.mirror_remote(Filter::all());

        let theirs = Team::new("Pushed", "rugby");
        fx.remote.put(theirs.clone());
        within(async {
            while local.next().await != Some(vec![theirs.clone()]) {}
        })
        .await;

        fx.remote.remove(theirs.id());
        within(async {
            while local.next().await != Some(Vec::new()) {}
        })
        .await;

        assert!(!mirror.is_finished());
        drop(mirror);
    }

    /// Local store that parks every remote apply until released
    struct PausedApply {
        inner: SqliteLocalStore<Team>,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl LocalStore<Team> for PausedApply {
        async fn upsert(&self, record: &Team) -> Result<()> {
            self.inner.upsert(record).await
        }

        async fn get_by_id(&self, id: &RecordId) -> Result<Option<Team>> {
            self.inner.get_by_id(id).await
        }

        async fn fetch(&self, filter: &Filter) -> Result<Vec<Team>> {
            self.inner.fetch(filter).await
        }

        async fn observe_all(&self, filter: Filter) -> Result<LocalObservation<Team>> {
            self.inner.observe_all(filter).await
        }

        async fn delete(&self, id: &RecordId) -> Result<bool> {
            self.inner.delete(id).await
        }

        async fn delete_matching(&self, filter: &Filter) -> Result<usize> {
            self.inner.delete_matching(filter).await
        }

        async fn commit_batch(&self, batch: SyncBatch<Team>) -> Result<()> {
            self.inner.commit_batch(batch).await
        }

        async fn apply_remote(
            &self,
            scope: &Filter,
            remote: Vec<Team>,
            keep_local: &(dyn for<'r> Fn(&'r RecordId) -> bool + Send + Sync),
        ) -> Result<Reconciliation<Team>> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.apply_remote(scope, remote, keep_local).await
        }

        async fn clear_stain(&self, meta: &RecordMeta) -> Result<bool> {
            self.inner.clear_stain(meta).await
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_during_pull_survives_and_stays_staged() {
        let clock = Arc::new(ManualClock::new(T0));
        let guard = Arc::new(EditGuard::new(clock.clone()));
        let db = Database::open_in_memory().unwrap();
        let remote = MemoryRemoteStore::<Team>::new();
        let writer = CombinedRepository::new(
            Arc::new(SqliteLocalStore::new(db.clone())),
            Arc::new(remote.clone()),
            guard.clone(),
        );
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let syncer = CombinedRepository::new(
            Arc::new(PausedApply {
                inner: SqliteLocalStore::new(db),
                entered: entered.clone(),
                release: release.clone(),
            }),
            Arc::new(remote.clone()),
            guard.clone(),
        );

        let team = writer
            .upsert(Team::new("Remote v1", "hockey"))
            .await
            .unwrap()
            .record;
        clock.advance(60_000);
        remote.put(named(&team, "Remote v2"));

        let pull = tokio::spawn({
            let syncer = syncer.clone();
            async move { syncer.sync().await }
        });
        within(entered.notified()).await;

        // The pull has its snapshot; a local edit lands before it is applied
        remote.set_offline(true);
        let edit = writer.upsert(named(&team, "Local edit")).await.unwrap();
        assert!(!edit.outcome.is_synced());
        release.notify_one();

        let report = within(pull).await.unwrap().unwrap();
        assert_eq!(report.skipped_guarded, 1);
        assert_eq!(report.applied, 0);

        let stored = writer.get(team.id()).await.unwrap();
        assert_eq!(stored.name, "Local edit");
        assert_eq!(stored.meta.stained_at, Some(T0 + 60_000));
        assert!(guard.was_recently_edited(team.id()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scope_limits_sync_and_delete_all() {
        let fx = fixture::<Event>();
        let ours = RecordId::from("t1");
        let scoped = fx
            .repo
            .clone()
            .with_scope(Filter::all().field_eq("team_id", &ours));

        let other = fx
            .repo
            .upsert(Event::new(RecordId::from("t2"), "Other team", 10))
            .await
            .unwrap()
            .record;
        fx.remote.put(Event::new(ours.clone(), "Ours", 20));
        fx.clock.advance(60_000);
        fx.remote.remove(other.id());

        let report = scoped.sync().await.unwrap();
        assert_eq!(report.pulled, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(fx.repo.list(Filter::all()).await.len(), 2);

        assert_eq!(scoped.delete_all().await.unwrap(), 1);
        assert_eq!(fx.repo.list(Filter::all()).await, vec![other]);
    }
}
