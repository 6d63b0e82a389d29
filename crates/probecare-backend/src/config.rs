//! Backend connection configuration
//!
//! Read from a TOML table, then overridden by environment variables:
//! - `PROBECARE_URL`
//! - `PROBECARE_ANON_KEY`
//! - `PROBECARE_SESSION_FILE`

use probecare_session::provider::DEFAULT_EVENT_CAPACITY;
use probecare_session::ConfigError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_URL: &str = "PROBECARE_URL";
pub const ENV_ANON_KEY: &str = "PROBECARE_ANON_KEY";
pub const ENV_SESSION_FILE: &str = "PROBECARE_SESSION_FILE";

/// Backend connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project base URL
    pub url: String,
    /// Public (anon) API key sent with every request
    pub anon_key: String,
    /// Table holding user profiles
    pub profile_table: String,
    /// Table holding client records
    pub clients_table: String,
    /// Storage bucket for uploads
    pub storage_bucket: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Where to persist the session between runs; `None` keeps it in memory
    pub session_file: Option<PathBuf>,
    /// Auth event buffer per subscriber
    pub event_capacity: usize,
}

impl BackendConfig {
    /// Create configuration for a project
    #[must_use]
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            ..Self::default()
        }
    }

    /// With session persistence at `path`
    #[inline]
    #[must_use]
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Request timeout as a duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse from TOML text (no environment overrides)
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, validated
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_URL).filter(|v| !v.is_empty()) {
            self.url = url;
        }
        if let Some(key) = lookup(ENV_ANON_KEY).filter(|v| !v.is_empty()) {
            self.anon_key = key;
        }
        if let Some(path) = lookup(ENV_SESSION_FILE).filter(|v| !v.is_empty()) {
            self.session_file = Some(PathBuf::from(path));
        }
    }

    /// Parsed base URL
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.url.trim()).map_err(|e| ConfigError::Invalid {
            field: "url",
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                field: "url",
                reason: "must be an http(s) base URL".to_string(),
            });
        }
        Ok(url)
    }

    /// Reject values the backend cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "url",
                reason: format!("must be set (or export {ENV_URL})"),
            });
        }
        self.base_url()?;
        if self.anon_key.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "anon_key",
                reason: format!("must be set (or export {ENV_ANON_KEY})"),
            });
        }
        for (field, value) in [
            ("profile_table", &self.profile_table),
            ("clients_table", &self.clients_table),
            ("storage_bucket", &self.storage_bucket),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            profile_table: "users".to_string(),
            clients_table: "clientes".to_string(),
            storage_bucket: "archivos".to_string(),
            request_timeout_secs: 30,
            session_file: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
