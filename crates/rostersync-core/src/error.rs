//! Error types for rostersync-core

use thiserror::Error;

/// Result type alias using rostersync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rostersync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote store rejected or failed an operation
    #[error("Remote error: {0}")]
    Remote(String),

    /// Remote subscription ended without a value
    #[error("Remote subscription closed")]
    RemoteClosed,

    /// Schema migration failed; the store was not opened
    #[error("Migration error: {0}")]
    Migration(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Remote(error.to_string())
    }
}
