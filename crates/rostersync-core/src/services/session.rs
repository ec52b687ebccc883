//! Shared wiring of one local database, one edit guard and a remote.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::db::{Database, SqliteLocalStore, StoreOptions, TableRecord};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::models::{
    Attendance, Broadcast, BroadcastStatus, Event, Lineup, MatchEvent, Notification, RecordId,
    Team, User,
};
use crate::remote::{HttpRemoteStore, MemoryRemoteStore};
use crate::sync::{
    CombinedRepository, EditGuard, RemoteStore, SyncScheduler, Syncable, SystemClock,
};

/// Repository over the local database and the HTTP remote
pub type HttpRepository<T> = CombinedRepository<T, SqliteLocalStore<T>, HttpRemoteStore<T>>;

/// Repository over the local database and an in-process remote
pub type MemoryRepository<T> = CombinedRepository<T, SqliteLocalStore<T>, MemoryRemoteStore<T>>;

/// Thread-safe handle every repository of a client is built from.
#[derive(Clone, Debug)]
pub struct SyncSession {
    db: Database,
    guard: Arc<EditGuard>,
    sync_config: SyncConfig,
}

impl SyncSession {
    /// Open the database at `db_path`, running migrations.
    pub fn open_path(
        db_path: impl Into<PathBuf>,
        options: StoreOptions,
        sync_config: SyncConfig,
    ) -> Result<Self> {
        let db_path = db_path.into();
        let db = Database::open_with(&db_path, options)?;
        if sync_config.is_configured() {
            tracing::info!(
                "Sync enabled with remote: {}",
                sync_config.url.as_deref().unwrap_or("unknown")
            );
        } else {
            tracing::info!("Running in local-only mode (no sync config)");
        }
        Ok(Self::from_database(db, sync_config))
    }

    /// Open an in-memory session (primarily for tests).
    pub fn open_in_memory(sync_config: SyncConfig) -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?, sync_config))
    }

    pub fn from_database(db: Database, sync_config: SyncConfig) -> Self {
        let guard = EditGuard::with_window(Arc::new(SystemClock), sync_config.edit_window);
        Self::with_guard(db, Arc::new(guard), sync_config)
    }

    /// Use an existing guard, e.g. one driven by a manual clock
    pub const fn with_guard(db: Database, guard: Arc<EditGuard>, sync_config: SyncConfig) -> Self {
        Self {
            db,
            guard,
            sync_config,
        }
    }

    pub const fn database(&self) -> &Database {
        &self.db
    }

    pub fn guard(&self) -> Arc<EditGuard> {
        Arc::clone(&self.guard)
    }

    pub const fn sync_config(&self) -> &SyncConfig {
        &self.sync_config
    }

    pub fn local<T: TableRecord>(&self) -> SqliteLocalStore<T> {
        SqliteLocalStore::new(self.db.clone())
    }

    /// Combine the local table for `T` with any remote
    pub fn repository<T, R>(&self, remote: R) -> CombinedRepository<T, SqliteLocalStore<T>, R>
    where
        T: TableRecord,
        R: RemoteStore<T> + 'static,
    {
        CombinedRepository::new(
            Arc::new(self.local()),
            Arc::new(remote),
            Arc::clone(&self.guard),
        )
    }

    pub fn memory_repository<T: TableRecord>(
        &self,
        remote: MemoryRemoteStore<T>,
    ) -> MemoryRepository<T> {
        self.repository(remote)
    }

    fn http_remote<T: TableRecord>(&self) -> Result<HttpRemoteStore<T>> {
        let url = self
            .sync_config
            .url
            .clone()
            .ok_or_else(|| Error::Config("remote base URL is not configured".to_string()))?;
        Ok(HttpRemoteStore::new(url, self.sync_config.auth_token.clone())?
            .with_poll_interval(self.sync_config.poll_interval))
    }

    pub fn http_repository<T: TableRecord>(&self) -> Result<HttpRepository<T>> {
        Ok(self.repository(self.http_remote()?))
    }

    /// Statuses of one broadcast, read from its remote sub-collection
    pub fn broadcast_status_repository(
        &self,
        broadcast_id: &RecordId,
    ) -> Result<HttpRepository<BroadcastStatus>> {
        let remote = self.http_remote::<BroadcastStatus>()?.nested_under(broadcast_id)?;
        Ok(self
            .repository(remote)
            .with_scope(Filter::all().field_eq("broadcast_id", broadcast_id)))
    }

    /// HTTP repositories for every top-level collection, parents first
    pub fn root_targets(&self) -> Result<Vec<Arc<dyn Syncable>>> {
        let targets: Vec<Arc<dyn Syncable>> = vec![
            Arc::new(self.http_repository::<Team>()?),
            Arc::new(self.http_repository::<User>()?),
            Arc::new(self.http_repository::<Event>()?),
            Arc::new(self.http_repository::<Attendance>()?),
            Arc::new(self.http_repository::<Lineup>()?),
            Arc::new(self.http_repository::<MatchEvent>()?),
            Arc::new(self.http_repository::<Broadcast>()?),
            Arc::new(self.http_repository::<Notification>()?),
        ];
        Ok(targets)
    }

    /// Start background sync when an interval is configured
    pub fn start_scheduler(&self, targets: Vec<Arc<dyn Syncable>>) -> Option<SyncScheduler> {
        let interval = self.sync_config.sync_interval?;
        tracing::info!("Background sync every {}s", interval.as_secs());
        Some(SyncScheduler::start(targets, interval))
    }
}
