//! Database connection management

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, MutexGuard};

use super::migrations::{current_version, SchemaMigrator};
use super::schema::TABLES;
use crate::error::Result;
use crate::models::EntityKind;

/// Capacity of the change-notification channel. Slow observers that fall
/// further behind re-query instead of replaying.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Options applied when a store is opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Turn on `PRAGMA foreign_keys` once migrations have run
    pub enforce_foreign_keys: bool,
    /// Stop migrating at this version instead of the latest
    pub target_version: Option<u32>,
}

impl StoreOptions {
    #[must_use]
    pub const fn with_foreign_keys(mut self) -> Self {
        self.enforce_foreign_keys = true;
        self
    }

    #[must_use]
    pub const fn at_version(mut self, version: u32) -> Self {
        self.target_version = Some(version);
        self
    }
}

/// Row counts for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub table: &'static str,
    pub rows: i64,
    /// Rows holding a write the remote has not confirmed
    pub staged: i64,
    /// Soft-deleted rows
    pub stashed: i64,
}

/// Shared handle to the local `SQLite` store.
///
/// Cloning is cheap; all clones use the same connection and the same change
/// notifications.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<EntityKind>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()), options)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(StoreOptions::default())
    }

    pub fn open_in_memory_with(options: StoreOptions) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None, options)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>, options: StoreOptions) -> Result<Self> {
        configure(&conn)?;

        let migrator = SchemaMigrator::shipped()?;
        let target = options
            .target_version
            .unwrap_or_else(|| migrator.latest_version());
        let version = migrator.migrate_to(&mut conn, target)?;

        if options.enforce_foreign_keys {
            conn.pragma_update(None, "foreign_keys", true)?;
        }
        tracing::debug!(
            "Opened store {} at schema v{version}",
            path.as_deref()
                .map_or_else(|| ":memory:".into(), |path| path.display().to_string())
        );

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
            path,
        })
    }

    /// On-disk location, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Exclusive access to the connection
    pub async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    pub async fn schema_version(&self) -> Result<u32> {
        let conn = self.lock().await;
        current_version(&conn)
    }

    /// Announce that rows of `kind` changed
    pub fn notify(&self, kind: EntityKind) {
        // No receivers is not an error
        self.changes.send(kind).ok();
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<EntityKind> {
        self.changes.subscribe()
    }

    pub async fn foreign_keys_enforced(&self) -> Result<bool> {
        let conn = self.lock().await;
        Ok(conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?)
    }

    /// Row, staged and stashed counts for every current table
    pub async fn table_stats(&self) -> Result<Vec<TableStats>> {
        let conn = self.lock().await;
        TABLES
            .iter()
            .map(|table| -> Result<TableStats> {
                let (rows, staged, stashed) = conn.query_row(
                    &format!(
                        "SELECT COUNT(*),
                                COUNT(stained_at),
                                COUNT(stashed_at)
                         FROM {}",
                        table.name
                    ),
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;
                Ok(TableStats {
                    table: table.name,
                    rows,
                    staged,
                    stashed,
                })
            })
            .collect()
    }
}

/// Configure `SQLite` for the sync workload
fn configure(conn: &Connection) -> Result<()> {
    // WAL is unavailable for in-memory databases
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .ok();
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    // Rebuilds and out-of-order sync need this off until migration is done
    conn.pragma_update(None, "foreign_keys", false)?;
    conn.pragma_update(None, "cache_size", 10_000)?;
    Ok(())
}
