use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::DateTime;
use rostersync_core::models::Broadcast;
use rostersync_core::sync::{LocalStore, Syncable};
use rostersync_core::{ClientConfig, Filter, SyncSession, SyncedRecord};

use crate::error::CliError;

pub const DB_PATH_ENV: &str = "ROSTERSYNC_DB_PATH";
pub const CONFIG_PATH_ENV: &str = "ROSTERSYNC_CONFIG";
const CONFIG_FILE_NAME: &str = "config.json";

/// Resolved configuration for one invocation
#[derive(Debug, Clone)]
pub struct Context {
    pub config: ClientConfig,
    pub db_path: PathBuf,
}

impl Context {
    pub fn load(cli_config: Option<PathBuf>, cli_db_path: Option<PathBuf>) -> Result<Self, CliError> {
        let config_path = cli_config
            .or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(default_config_path);
        let config = ClientConfig::load(&config_path)?.with_env_overrides()?;
        let db_path = resolve_db_path(
            cli_db_path,
            env::var_os(DB_PATH_ENV).map(PathBuf::from),
            config.database_path.clone(),
        );
        Ok(Self { config, db_path })
    }

    pub fn open_session(&self) -> Result<SyncSession, CliError> {
        self.open_session_with(&self.config)
    }

    pub fn open_session_with(&self, config: &ClientConfig) -> Result<SyncSession, CliError> {
        Ok(SyncSession::open_path(
            &self.db_path,
            config.store_options(),
            config.sync_config(),
        )?)
    }
}

/// Command line beats environment beats config file
pub fn resolve_db_path(
    cli_db_path: Option<PathBuf>,
    env_db_path: Option<PathBuf>,
    config_db_path: Option<PathBuf>,
) -> PathBuf {
    cli_db_path
        .or(env_db_path)
        .or(config_db_path)
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rostersync")
        .join("rostersync.db")
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rostersync")
        .join(CONFIG_FILE_NAME)
}

/// Every top-level collection plus the statuses of each known broadcast
pub async fn collect_targets(session: &SyncSession) -> Result<Vec<Arc<dyn Syncable>>, CliError> {
    if !session.sync_config().is_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let mut targets = session.root_targets()?;
    let broadcasts = session.local::<Broadcast>().fetch(&Filter::all()).await?;
    for broadcast in &broadcasts {
        targets.push(Arc::new(session.broadcast_status_repository(broadcast.id())?));
    }
    tracing::debug!(
        "Collected {} sync targets ({} broadcasts)",
        targets.len(),
        broadcasts.len()
    );
    Ok(targets)
}

pub fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis).map_or_else(
        || millis.to_string(),
        |time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn display_path(path: &Path) -> String {
    path.display().to_string()
}
