//! In-process remote store.
//!
//! Documents live in a map shared by all clones. Subscriptions are fed the
//! full matching snapshot after every change. Two switches simulate the
//! failure modes of a real backend: `set_offline` makes one-shot calls fail
//! and stalls subscriptions, `fail_permanently` ends every subscription with
//! an error.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::models::{RecordId, SyncedRecord};
use crate::sync::{RemotePublisher, RemoteStore, RemoteSubscription};

struct Inner<T> {
    documents: BTreeMap<RecordId, T>,
    subscribers: Vec<(Filter, RemotePublisher<T>)>,
    offline: bool,
    failure: Option<String>,
}

impl<T: SyncedRecord> Inner<T> {
    fn check_available(&self) -> Result<()> {
        if let Some(reason) = &self.failure {
            return Err(Error::Remote(reason.clone()));
        }
        if self.offline {
            return Err(Error::Remote("remote store is offline".into()));
        }
        Ok(())
    }

    fn snapshot(&self, filter: &Filter) -> Vec<T> {
        let mut records = self
            .documents
            .values()
            .filter(|record| filter.matches(*record))
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by(T::display_order);
        records
    }

    fn publish_all(&mut self) {
        self.subscribers
            .retain(|(_, publisher)| !publisher.is_closed());
        if self.offline {
            return;
        }
        for (filter, publisher) in &self.subscribers {
            publisher.publish(self.snapshot(filter));
        }
    }
}

pub struct MemoryRemoteStore<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for MemoryRemoteStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SyncedRecord> Default for MemoryRemoteStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for MemoryRemoteStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRemoteStore").finish_non_exhaustive()
    }
}

impl<T: SyncedRecord> MemoryRemoteStore<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                documents: BTreeMap::new(),
                subscribers: Vec::new(),
                offline: false,
                failure: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Toggle connectivity. Coming back online republishes every snapshot.
    pub fn set_offline(&self, offline: bool) {
        let mut inner = self.lock();
        inner.offline = offline;
        inner.publish_all();
    }

    /// Terminate every subscription and fail all later calls
    pub fn fail_permanently(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut inner = self.lock();
        for (_, publisher) in inner.subscribers.drain(..) {
            publisher.fail(reason.clone());
        }
        inner.failure = Some(reason);
    }

    /// Write a document as another client would, bypassing the switches
    pub fn put(&self, record: T) {
        let mut inner = self.lock();
        let record = record.for_remote();
        inner.documents.insert(record.id().clone(), record);
        inner.publish_all();
    }

    /// Remove a document as another client would
    pub fn remove(&self, id: &RecordId) -> Option<T> {
        let mut inner = self.lock();
        let removed = inner.documents.remove(id);
        inner.publish_all();
        removed
    }

    pub fn get(&self, id: &RecordId) -> Option<T> {
        self.lock().documents.get(id).cloned()
    }

    /// Every stored document in display order
    pub fn documents(&self) -> Vec<T> {
        self.lock().snapshot(&Filter::all())
    }

    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live subscriptions
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner
            .subscribers
            .retain(|(_, publisher)| !publisher.is_closed());
        inner.subscribers.len()
    }
}

#[async_trait]
impl<T: SyncedRecord> RemoteStore<T> for MemoryRemoteStore<T> {
    async fn save(&self, record: &T) -> Result<()> {
        let mut inner = self.lock();
        inner.check_available()?;
        let record = record.for_remote();
        inner.documents.insert(record.id().clone(), record);
        inner.publish_all();
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        let mut inner = self.lock();
        inner.check_available()?;
        if inner.documents.remove(id).is_some() {
            inner.publish_all();
        }
        Ok(())
    }

    fn observe(&self, filter: Filter) -> RemoteSubscription<T> {
        let (publisher, subscription) = RemoteSubscription::channel();
        let mut inner = self.lock();
        if let Some(reason) = &inner.failure {
            publisher.fail(reason.clone());
            return subscription;
        }
        if !inner.offline {
            publisher.publish(inner.snapshot(&filter));
        }
        inner.subscribers.push((filter, publisher));
        subscription
    }

    async fn fetch_once(&self, filter: &Filter) -> Result<Vec<T>> {
        let inner = self.lock();
        inner.check_available()?;
        Ok(inner.snapshot(filter))
    }
}
