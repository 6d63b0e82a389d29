//! Configuration file of the command-line front-end
//!
//! ```toml
//! [backend]
//! url = "https://project.example.co"
//! anon_key = "..."
//! session_file = "~/.probecare/session.json"
//!
//! [session]
//! display_name_fallback = "User"
//! ```
//!
//! Backend values can be overridden from the environment.

use probecare_backend::BackendConfig;
use probecare_session::{ConfigError, SyncConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub session: SyncConfig,
}

impl AppConfig {
    /// Parse from TOML text (no environment overrides)
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path` if given, apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`AppConfig::load`] with an explicit variable lookup
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.backend.apply_overrides(lookup);
        config.backend.validate()?;
        config.session.validate()?;
        Ok(config)
    }
}
