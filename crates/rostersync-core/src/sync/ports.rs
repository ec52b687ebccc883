//! Capability traits for the two stores a repository composes, plus the
//! channel types their reactive reads hand out.

use async_trait::async_trait;
use tokio::sync::watch;

use super::merge::Reconciliation;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::models::{RecordId, RecordMeta, SyncedRecord};

/// Upserts and deletions applied to a local store in one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct SyncBatch<T> {
    pub upserts: Vec<T>,
    pub deletes: Vec<RecordId>,
}

impl<T> SyncBatch<T> {
    pub const fn new() -> Self {
        Self {
            upserts: Vec::new(),
            deletes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

impl<T> Default for SyncBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Durable on-device storage for one entity.
///
/// Every call is atomic with respect to the others. Errors are fatal to the
/// calling operation.
#[async_trait]
pub trait LocalStore<T: SyncedRecord>: Send + Sync {
    /// Insert or replace by id
    async fn upsert(&self, record: &T) -> Result<()>;

    async fn get_by_id(&self, id: &RecordId) -> Result<Option<T>>;

    /// One-shot query in display order
    async fn fetch(&self, filter: &Filter) -> Result<Vec<T>>;

    /// Current matches, re-emitted after every change to the table.
    async fn observe_all(&self, filter: Filter) -> Result<LocalObservation<T>>;

    /// Physically delete one record; `false` if it was not there
    async fn delete(&self, id: &RecordId) -> Result<bool>;

    async fn delete_matching(&self, filter: &Filter) -> Result<usize>;

    async fn delete_all(&self) -> Result<usize> {
        self.delete_matching(&Filter::all()).await
    }

    async fn commit_batch(&self, batch: SyncBatch<T>) -> Result<()>;

    /// Make the rows matching `scope` agree with a remote snapshot.
    ///
    /// The current rows are read, reconciled and written back in one
    /// transaction, so a local write either lands before the decision and
    /// is seen by it, or lands after the remote data. Stained rows are never
    /// deleted and ids for which `keep_local` holds are left alone. Returns
    /// the plan that was committed.
    async fn apply_remote(
        &self,
        scope: &Filter,
        remote: Vec<T>,
        keep_local: &(dyn for<'r> Fn(&'r RecordId) -> bool + Send + Sync),
    ) -> Result<Reconciliation<T>>;

    /// Clear the stain of the stored row if it still carries the write
    /// described by `meta`. A newer local write keeps its stain.
    async fn clear_stain(&self, meta: &RecordMeta) -> Result<bool>;
}

/// Cloud-side authoritative storage for one entity.
///
/// No retries happen here; transient failures reach the caller.
#[async_trait]
pub trait RemoteStore<T: SyncedRecord>: Send + Sync {
    /// Idempotent upsert keyed by id
    async fn save(&self, record: &T) -> Result<()>;

    async fn delete(&self, id: &RecordId) -> Result<()>;

    /// Push-driven view of the matching documents.
    ///
    /// May stall while connectivity is lost; a permanent failure is
    /// delivered as an error item, after which the subscription ends.
    fn observe(&self, filter: Filter) -> RemoteSubscription<T>;

    async fn fetch_once(&self, filter: &Filter) -> Result<Vec<T>>;

    /// Delete every matching document, returning how many were removed
    async fn delete_all(&self, filter: &Filter) -> Result<usize> {
        let records = self.fetch_once(filter).await?;
        for record in &records {
            self.delete(record.id()).await?;
        }
        Ok(records.len())
    }
}

/// Latest-wins stream of local query results.
///
/// The first [`next`](Self::next) yields the result current at subscription
/// time; later calls wait for a changed result.
#[derive(Debug)]
pub struct LocalObservation<T> {
    rx: watch::Receiver<Vec<T>>,
    fresh: bool,
}

impl<T: Clone> LocalObservation<T> {
    pub const fn new(rx: watch::Receiver<Vec<T>>) -> Self {
        Self { rx, fresh: true }
    }

    pub fn current(&self) -> Vec<T> {
        self.rx.borrow().clone()
    }

    /// Next result, or `None` once the store side has shut down.
    pub async fn next(&mut self) -> Option<Vec<T>> {
        if std::mem::take(&mut self.fresh) {
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn into_receiver(self) -> watch::Receiver<Vec<T>> {
        self.rx
    }
}

/// State of a remote subscription
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent<T> {
    /// Nothing received yet
    Pending,
    Snapshot(Vec<T>),
    /// Terminal failure
    Failed(String),
}

/// Receiving side of a remote push subscription.
///
/// Dropping it cancels the subscription; the publisher observes this
/// through [`RemotePublisher::closed`].
#[derive(Debug)]
pub struct RemoteSubscription<T> {
    rx: watch::Receiver<RemoteEvent<T>>,
    finished: bool,
}

impl<T: Clone> RemoteSubscription<T> {
    pub fn channel() -> (RemotePublisher<T>, Self) {
        let (tx, rx) = watch::channel(RemoteEvent::Pending);
        (
            RemotePublisher { tx },
            Self {
                rx,
                finished: false,
            },
        )
    }

    /// Next snapshot. Yields `Some(Err(..))` once on permanent failure and
    /// `None` after that or when the publisher goes away.
    pub async fn next(&mut self) -> Option<Result<Vec<T>>> {
        while !self.finished {
            if self.rx.changed().await.is_err() {
                self.finished = true;
                break;
            }
            let event = self.rx.borrow_and_update().clone();
            match event {
                RemoteEvent::Pending => {}
                RemoteEvent::Snapshot(records) => return Some(Ok(records)),
                RemoteEvent::Failed(message) => {
                    self.finished = true;
                    return Some(Err(Error::Remote(message)));
                }
            }
        }
        None
    }

    pub fn latest(&self) -> RemoteEvent<T> {
        self.rx.borrow().clone()
    }
}

/// Sending side of a remote subscription, held by the adapter
#[derive(Debug)]
pub struct RemotePublisher<T> {
    tx: watch::Sender<RemoteEvent<T>>,
}

impl<T: PartialEq> RemotePublisher<T> {
    /// Publish a snapshot; identical consecutive snapshots are dropped.
    pub fn publish(&self, records: Vec<T>) -> bool {
        self.tx.send_if_modified(|current| match current {
            RemoteEvent::Snapshot(previous) if *previous == records => false,
            RemoteEvent::Failed(_) => false,
            _ => {
                *current = RemoteEvent::Snapshot(records);
                true
            }
        })
    }

    /// End the subscription with a permanent error
    pub fn fail(&self, message: impl Into<String>) {
        self.tx.send_replace(RemoteEvent::Failed(message.into()));
    }

    /// Resolves when the subscriber has dropped its end
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_subscription_dedups_and_ends_after_failure() {
        let (publisher, mut subscription) = RemoteSubscription::<i32>::channel();
        assert!(publisher.publish(vec![1]));
        assert!(!publisher.publish(vec![1]));
        assert_eq!(subscription.next().await.unwrap().unwrap(), vec![1]);

        publisher.publish(vec![1, 2]);
        publisher.publish(vec![3]);
        // Latest wins
        assert_eq!(subscription.next().await.unwrap().unwrap(), vec![3]);

        publisher.fail("gone");
        assert!(!publisher.publish(vec![4]));
        assert!(matches!(subscription.next().await, Some(Err(Error::Remote(m))) if m == "gone"));
        assert!(subscription.next().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_subscription_ends_when_publisher_dropped() {
        let (publisher, mut subscription) = RemoteSubscription::<i32>::channel();
        publisher.publish(vec![7]);
        drop(publisher);
        assert_eq!(subscription.next().await.unwrap().unwrap(), vec![7]);
        assert!(subscription.next().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_publisher_sees_cancellation() {
        let (publisher, subscription) = RemoteSubscription::<i32>::channel();
        assert!(!publisher.is_closed());
        drop(subscription);
        publisher.closed().await;
        assert!(publisher.is_closed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_observation_yields_current_first() {
        let (tx, rx) = watch::channel(vec![1]);
        let mut observation = LocalObservation::new(rx);
        assert_eq!(observation.next().await, Some(vec![1]));
        tx.send_replace(vec![1, 2]);
        assert_eq!(observation.next().await, Some(vec![1, 2]));
        drop(tx);
        assert_eq!(observation.next().await, None);
    }
}
