//! Local durable store: connection, schema history and typed tables

mod connection;
mod local_store;
pub mod migrations;
pub mod schema;
mod tables;

pub use connection::{Database, StoreOptions, TableStats};
pub use local_store::SqliteLocalStore;
pub use migrations::{CodeMapping, MigrationStep, SchemaMigrator};
pub use schema::CURRENT_VERSION;
pub use tables::{Cells, TableRecord, META_COLUMNS};
