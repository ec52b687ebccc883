//! Periodic background sync over a set of repositories

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::ports::{LocalStore, RemoteStore};
use super::repository::{CombinedRepository, SyncReport};
use crate::error::Result;
use crate::models::SyncedRecord;
use crate::state::SyncState;

/// Anything that can run one sync pass
#[async_trait]
pub trait Syncable: Send + Sync {
    /// Name used in logs
    fn label(&self) -> String;

    async fn sync(&self) -> Result<SyncReport>;
}

#[async_trait]
impl<T, L, R> Syncable for CombinedRepository<T, L, R>
where
    T: SyncedRecord,
    L: LocalStore<T> + 'static,
    R: RemoteStore<T> + 'static,
{
    fn label(&self) -> String {
        T::KIND.to_string()
    }

    async fn sync(&self) -> Result<SyncReport> {
        Self::sync(self).await
    }
}

/// Run one pass over every target in order. Failures are logged and do
/// not stop later targets.
pub async fn sync_all(targets: &[Arc<dyn Syncable>]) -> (SyncReport, usize) {
    let mut total = SyncReport::default();
    let mut failed = 0;
    for target in targets {
        match target.sync().await {
            Ok(report) => total.absorb(report),
            Err(error) => {
                failed += 1;
                tracing::warn!("Sync of {} failed: {error}", target.label());
            }
        }
    }
    (total, failed)
}

/// Handle to the background loop
#[derive(Debug)]
pub struct SyncScheduler {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<SyncState>,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    /// Sync every target now and then once per `interval`
    pub fn start(targets: Vec<Arc<dyn Syncable>>, interval: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let (state_tx, state) = watch::channel(SyncState::Offline);

        let task = tokio::spawn(async move {
            loop {
                state_tx.send_replace(SyncState::Syncing);
                let (report, failed) = sync_all(&targets).await;
                if failed == 0 {
                    tracing::debug!("Background sync complete: {report}");
                    state_tx.send_replace(SyncState::Synced);
                } else {
                    tracing::warn!("Background sync finished with {failed} failing targets");
                    state_tx.send_replace(SyncState::Error);
                }

                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    _ = stop.changed() => break,
                }
            }
            tracing::info!("Background sync stopped");
        });

        Self {
            shutdown,
            state,
            task,
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Receiver that follows the loop's state
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Stop the loop and wait for the pass in flight to finish
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        self.task.await.ok();
    }
}
