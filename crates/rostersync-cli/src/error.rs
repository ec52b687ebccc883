use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] rostersync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Sync finished with {0} failing collections")]
    SyncFailed(usize),
    #[error(
        "Sync is not configured. Set remote_base_url and auth_token in the config file, or set ROSTERSYNC_REMOTE_URL and ROSTERSYNC_AUTH_TOKEN."
    )]
    SyncNotConfigured,
}
