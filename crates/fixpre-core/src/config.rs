//! Application configuration management.
//!
//! This module handles loading the client configuration: the API
//! hosts, upload limits, polling cadence and which credential backend holds
//! the token.
//!
//! Configuration is stored at `~/.config/fixpre/config.json`. The
//! `FIXPRE_API_URL` and `FIXPRE_UPLOAD_URL` environment variables override the
//! hosts from the file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::feedback::{PollTiming, UploadPolicy};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "fixpre";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Session (token) file name in the cache directory
const SESSION_FILE: &str = "session.json";

pub const DEFAULT_API_BASE_URL: &str = "https://fixpre.api.kengroq.uz/api";

pub const API_URL_ENV: &str = "FIXPRE_API_URL";
pub const UPLOAD_URL_ENV: &str = "FIXPRE_UPLOAD_URL";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Largest presentation the service accepts.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 15 * 1024 * 1024;

const DEFAULT_INITIAL_POLL_DELAY_MS: u64 = 3000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// 150 polls at 2s is five minutes of waiting.
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 150;

/// Where the bearer token is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackendKind {
    /// JSON file in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Host for uploads and job results; the API host when unset
    pub upload_base_url: Option<String>,
    pub request_timeout_secs: u64,
    /// `None` disables the size check
    pub max_upload_bytes: Option<u64>,
    pub initial_poll_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub credential_backend: CredentialBackendKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            upload_base_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_upload_bytes: Some(DEFAULT_MAX_UPLOAD_BYTES),
            initial_poll_delay_ms: DEFAULT_INITIAL_POLL_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            credential_backend: CredentialBackendKind::File,
        }
    }
}

impl Config {
    /// Load the config file (defaults when absent) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(UPLOAD_URL_ENV).ok(),
        );
        Ok(config)
    }

    /// Defaults pointed at a single host, for tests and ad-hoc clients.
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            api_base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    /// Replace the hosts with non-empty override values.
    pub fn apply_overrides(&mut self, api_url: Option<String>, upload_url: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(url) = upload_url.filter(|u| !u.trim().is_empty()) {
            self.upload_base_url = Some(url);
        }
    }

    pub fn feedback_base_url(&self) -> &str {
        self.upload_base_url
            .as_deref()
            .unwrap_or(&self.api_base_url)
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_bytes: self.max_upload_bytes,
        }
    }

    pub fn poll_timing(&self) -> PollTiming {
        PollTiming {
            initial_delay: Duration::from_millis(self.initial_poll_delay_ms),
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn session_path(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(SESSION_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.max_upload_bytes, Some(15 * 1024 * 1024));
        assert_eq!(config.feedback_base_url(), DEFAULT_API_BASE_URL);

        let timing = config.poll_timing();
        assert_eq!(timing.initial_delay, Duration::from_millis(3000));
        assert_eq!(timing.interval, Duration::from_millis(2000));
        assert_eq!(timing.max_attempts, 150);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"upload_base_url": "http://localhost:8192/api"}"#).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.feedback_base_url(), "http://localhost:8192/api");
        assert_eq!(config.credential_backend, CredentialBackendKind::File);
    }

    #[test]
    fn test_null_upload_limit_disables_check() {
        let config: Config = serde_json::from_str(r#"{"max_upload_bytes": null}"#).unwrap();
        assert_eq!(config.upload_policy().max_bytes, None);
    }

    #[test]
    fn test_keyring_backend_parses() {
        let config: Config =
            serde_json::from_str(r#"{"credential_backend": "keyring"}"#).unwrap();
        assert_eq!(config.credential_backend, CredentialBackendKind::Keyring);
    }

    #[test]
    fn test_apply_overrides_ignores_empty_values() {
        let mut config = Config::default();
        config.apply_overrides(Some("  ".to_string()), None);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);

        config.apply_overrides(
            Some("http://127.0.0.1:9000/api".to_string()),
            Some("http://127.0.0.1:8192/api".to_string()),
        );
        assert_eq!(config.api_base_url, "http://127.0.0.1:9000/api");
        assert_eq!(config.feedback_base_url(), "http://127.0.0.1:8192/api");
    }
}
