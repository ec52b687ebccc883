//! Client configuration.
//!
//! `SyncConfig` carries the runtime settings handed to the sync layer.
//! `ClientConfig` is the on-disk JSON form read by clients such as the CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::StoreOptions;
use crate::error::{Error, Result};
use crate::remote::DEFAULT_POLL_INTERVAL;
use crate::sync::DEFAULT_EDIT_WINDOW;
use crate::util::{is_http_url, normalize_text_option};

/// Environment variable overriding the remote base URL
pub const REMOTE_URL_ENV: &str = "ROSTERSYNC_REMOTE_URL";
/// Environment variable overriding the remote auth token
pub const AUTH_TOKEN_ENV: &str = "ROSTERSYNC_AUTH_TOKEN";

const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Runtime settings for talking to the remote
#[derive(Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Remote document API base URL
    pub url: Option<String>,
    /// Bearer token for the remote
    pub auth_token: Option<String>,
    /// Automatic sync interval (default: 60 seconds)
    pub sync_interval: Option<Duration>,
    /// How long a local write shadows remote data (default: 8 seconds)
    pub edit_window: Duration,
    /// Delay between polls of observed remote collections (default: 5 seconds)
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth_token: None,
            sync_interval: Some(DEFAULT_SYNC_INTERVAL),
            edit_window: DEFAULT_EDIT_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("url", &self.url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("sync_interval", &self.sync_interval)
            .field("edit_window", &self.edit_window)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl SyncConfig {
    /// Create a new sync configuration
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            auth_token: Some(auth_token.into()),
            ..Self::default()
        }
    }

    /// Set the automatic sync interval
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Disable automatic sync (manual sync only)
    #[must_use]
    pub const fn without_auto_sync(mut self) -> Self {
        self.sync_interval = None;
        self
    }

    #[must_use]
    pub const fn with_edit_window(mut self, window: Duration) -> Self {
        self.edit_window = window;
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Check if sync is configured
    pub const fn is_configured(&self) -> bool {
        self.url.is_some() && self.auth_token.is_some()
    }
}

/// JSON configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub remote_base_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub edit_window_secs: Option<u64>,
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub enforce_foreign_keys: bool,
}

impl ClientConfig {
    /// Read and validate a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|error| {
            Error::Config(format!("invalid config file {}: {error}", path.display()))
        })?;
        config.validate()
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        config.validate()
    }

    /// Normalize values and reject unusable ones
    pub fn validate(mut self) -> Result<Self> {
        self.remote_base_url = match normalize_text_option(self.remote_base_url) {
            Some(url) => Some(normalize_http_url(url, "remote_base_url").map_err(Error::Config)?),
            None => None,
        };
        self.auth_token = normalize_text_option(self.auth_token);

        for (field, value) in [
            ("edit_window_secs", self.edit_window_secs),
            ("sync_interval_secs", self.sync_interval_secs),
            ("poll_interval_secs", self.poll_interval_secs),
        ] {
            if value == Some(0) {
                return Err(Error::Config(format!("config field '{field}' must be positive")));
            }
        }
        Ok(self)
    }

    /// Apply `ROSTERSYNC_REMOTE_URL` and `ROSTERSYNC_AUTH_TOKEN` when set
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(
            std::env::var(REMOTE_URL_ENV).ok(),
            std::env::var(AUTH_TOKEN_ENV).ok(),
        )
    }

    pub fn apply_overrides(
        mut self,
        remote_base_url: Option<String>,
        auth_token: Option<String>,
    ) -> Result<Self> {
        if let Some(url) = normalize_text_option(remote_base_url) {
            self.remote_base_url = Some(url);
        }
        if let Some(token) = normalize_text_option(auth_token) {
            self.auth_token = Some(token);
        }
        self.validate()
    }

    pub fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig {
            url: self.remote_base_url.clone(),
            auth_token: self.auth_token.clone(),
            ..SyncConfig::default()
        };
        if let Some(secs) = self.sync_interval_secs {
            config = config.with_sync_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.edit_window_secs {
            config = config.with_edit_window(Duration::from_secs(secs));
        }
        if let Some(secs) = self.poll_interval_secs {
            config = config.with_poll_interval(Duration::from_secs(secs));
        }
        config
    }

    pub fn store_options(&self) -> StoreOptions {
        if self.enforce_foreign_keys {
            StoreOptions::default().with_foreign_keys()
        } else {
            StoreOptions::default()
        }
    }
}

fn normalize_http_url(raw: String, field: &str) -> std::result::Result<String, String> {
    let value = normalize_text_option(Some(raw))
        .ok_or_else(|| format!("config field '{field}' is required"))?;
    if is_http_url(&value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(format!(
            "config field '{field}' must include http:// or https://"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.edit_window, Duration::from_secs(8));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert!(!config.is_configured());
        assert!(SyncConfig::new("https://a", "t").is_configured());
        assert_eq!(SyncConfig::default().without_auto_sync().sync_interval, None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", SyncConfig::new("https://a", "hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let error = ClientConfig::parse(r#"{"remote_url": "https://a"}"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn test_parse_validates_url_and_windows() {
        assert!(ClientConfig::parse(r#"{"remote_base_url": "ftp://a"}"#).is_err());
        assert!(ClientConfig::parse(r#"{"edit_window_secs": 0}"#).is_err());

        let config = ClientConfig::parse(
            r#"{"remote_base_url": " https://api.example.com/ ", "auth_token": "  ", "sync_interval_secs": 30}"#,
        )
        .unwrap();
        assert_eq!(config.remote_base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.auth_token, None);
        assert_eq!(config.sync_config().sync_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let config = ClientConfig::parse(r#"{"remote_base_url": "https://file.example.com"}"#)
            .unwrap()
            .apply_overrides(Some("https://env.example.com/".into()), Some("token".into()))
            .unwrap();
        let sync = config.sync_config();
        assert_eq!(sync.url.as_deref(), Some("https://env.example.com"));
        assert!(sync.is_configured());

        let kept = config.clone().apply_overrides(None, Some(String::new())).unwrap();
        assert_eq!(kept, config);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert!(!config.store_options().enforce_foreign_keys);
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let error = ClientConfig::load(&path).unwrap_err();
        assert!(error.to_string().contains("config.json"));
    }
}
