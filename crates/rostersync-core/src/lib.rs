//! rostersync-core - Core library for rostersync
//!
//! This crate contains the offline-first sync layer shared by rostersync
//! clients: the entity models, the `SQLite` local store and its schema
//! history, remote store adapters, and the combined repositories that keep
//! the two in step.

pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::{ClientConfig, SyncConfig};
pub use db::{Database, SqliteLocalStore, StoreOptions};
pub use error::{Error, Result};
pub use filter::Filter;
pub use models::{EntityKind, RecordId, RecordMeta, SyncedRecord};
pub use services::SyncSession;
pub use state::{FeedStatus, SyncState};
pub use sync::{CombinedRepository, EditGuard, SyncReport, WriteOutcome};
