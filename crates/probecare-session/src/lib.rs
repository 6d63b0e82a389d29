//! ProbeCare Session - client-side auth state synchronizer
//!
//! Mirrors the external provider's session and the matching business profile:
//! - Restores a persisted session at startup
//! - Reconciles state from the provider's auth event stream
//! - Exposes login, register, logout and profile update
//! - Publishes snapshots for views to render from
//!
//! # Example
//!
//! ```rust,ignore
//! use probecare_session::prelude::*;
//!
//! # async fn example(backend: std::sync::Arc<dyn Backend>) -> Result<(), SessionError> {
//! let sync = SessionSynchronizer::start(backend, SyncConfig::new());
//!
//! let account = sync.login("eva@probecare.io", "secret").await?;
//! let state = sync
//!     .wait_for(|s| s.profile.as_ref().is_some_and(|p| p.id == account))
//!     .await?;
//! println!("Signed in as {}", state.display_name("User"));
//!
//! sync.dispose();
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod provider;
pub mod state;
pub mod state_machine;
pub mod synchronizer;
pub mod types;

pub use config::SyncConfig;
pub use error::{ConfigError, ProviderError, SessionError};
pub use provider::{AuthEventBus, AuthProvider, Backend, ProfileStore, Subscription};
pub use state::SynchronizerState;
pub use state_machine::Phase;
pub use synchronizer::SessionSynchronizer;
pub use types::{
    AccountId, AuthEvent, AuthStateChange, Identity, Profile, ProfileDraft, ProfileUpdate,
    Registration, Role, Session, SessionUser,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the session synchronizer
    pub use crate::{
        AccountId, Backend, Phase, Profile, ProfileDraft, ProfileUpdate, Registration, Role,
        Session, SessionError, SessionSynchronizer, SyncConfig, SynchronizerState,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
