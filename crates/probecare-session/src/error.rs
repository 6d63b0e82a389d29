//! Error types for the session layer
//!
//! Two levels:
//! - `ProviderError` is what a backend reports for a single external call
//! - `SessionError` is what the synchronizer records on its state and
//!   returns to callers

use crate::state_machine::Phase;
use crate::types::AccountId;

/// Failure of a single call to the external auth/data provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered and refused the request
    #[error("{message}")]
    Rejected {
        /// HTTP-style status code, when the provider has one
        status: Option<u16>,
        /// Provider-supplied message
        message: String,
    },

    /// The requested row or object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The call requires a signed-in session and there is none
    #[error("no active session")]
    NotSignedIn,

    /// The provider could not be reached
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with something we could not read
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Rejection without a status code
    #[inline]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            status: None,
            message: message.into(),
        }
    }

    /// Check if a retry could succeed without user action
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }
}

/// Error surfaced by synchronizer operations and stored on its state
///
/// `Clone` so the latest error can live in snapshots handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Bad credentials, duplicate account, failed sign-out
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Profile row missing or unreadable
    #[error("could not load profile: {0}")]
    ProfileFetch(String),

    /// Profile insert or update rejected
    #[error("could not save profile: {0}")]
    ProfileWrite(String),

    /// Sign-up created the identity but the profile row was not inserted.
    /// The identity is left in place for manual reconciliation.
    #[error("account {account} was created but its profile was not saved: {reason}")]
    RegistrationIncomplete {
        /// Identity that now exists without a profile
        account: AccountId,
        /// Why the insert failed
        reason: String,
    },

    /// Operation needs a signed-in session
    #[error("not authenticated")]
    NotAuthenticated,

    /// Caller-supplied input is unusable
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The synchronizer has been torn down
    #[error("session synchronizer has been disposed")]
    Disposed,

    /// Internal bookkeeping observed a phase change the lifecycle forbids
    #[error("illegal phase transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Phase before the change
        from: Phase,
        /// Phase after the change
        to: Phase,
    },
}

impl SessionError {
    /// Check if the operation was refused before any external call
    #[inline]
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated | Self::InvalidInput(_) | Self::Disposed
        )
    }

    /// Check if this error left an identity without a profile
    #[inline]
    #[must_use]
    pub fn is_orphaned_identity(&self) -> bool {
        matches!(self, Self::RegistrationIncomplete { .. })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Path that failed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for the expected shape
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_displays_provider_message() {
        let err = ProviderError::rejected("Invalid login credentials");
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Transport("reset".into()).is_transient());
        assert!(ProviderError::Rejected {
            status: Some(503),
            message: "busy".into()
        }
        .is_transient());
        assert!(!ProviderError::Rejected {
            status: Some(400),
            message: "bad".into()
        }
        .is_transient());
        assert!(!ProviderError::NotSignedIn.is_transient());
    }

    #[test]
    fn precondition_errors_are_classified() {
        assert!(SessionError::NotAuthenticated.is_precondition());
        assert!(SessionError::Disposed.is_precondition());
        assert!(!SessionError::Auth("nope".into()).is_precondition());
    }

    #[test]
    fn orphaned_identity_is_flagged() {
        let err = SessionError::RegistrationIncomplete {
            account: AccountId::new(),
            reason: "duplicate key".into(),
        };
        assert!(err.is_orphaned_identity());
        assert!(err.to_string().contains("duplicate key"));
    }
}
