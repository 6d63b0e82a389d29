//! Synchronizer configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Display name used when neither a profile name nor a session email is known
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// Synchronizer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fallback for [`SynchronizerState::display_name`](crate::SynchronizerState::display_name)
    pub display_name_fallback: String,
    /// Re-read the profile on every SIGNED_IN event, even when one for the
    /// same account is already cached
    pub refetch_profile_on_sign_in: bool,
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With display name fallback
    #[inline]
    #[must_use]
    pub fn with_display_name_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.display_name_fallback = fallback.into();
        self
    }

    /// With profile refetch on every sign-in
    #[inline]
    #[must_use]
    pub fn with_refetch_on_sign_in(mut self, refetch: bool) -> Self {
        self.refetch_profile_on_sign_in = refetch;
        self
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values the synchronizer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display_name_fallback.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "display_name_fallback",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            display_name_fallback: DEFAULT_DISPLAY_NAME.to_string(),
            refetch_profile_on_sign_in: false,
        }
    }
}
