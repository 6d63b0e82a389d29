//! Capability interface of the external auth/data provider
//!
//! The synchronizer never talks to a backend directly; it is handed something
//! implementing both [`AuthProvider`] and [`ProfileStore`]. The auth event
//! stream is a broadcast channel wrapped in [`AuthEventBus`] on the provider
//! side and [`Subscription`] on the consumer side.

use crate::error::ProviderError;
use crate::types::{AccountId, AuthStateChange, Identity, Profile, ProfileUpdate, Session};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Default capacity of the auth event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Identity operations and the auth event stream
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange credentials for a session
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError>;

    /// Create a new identity
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, ProviderError>;

    /// End the current session
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Session persisted from an earlier run, if any
    async fn get_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Start receiving auth lifecycle events
    fn on_auth_state_change(&self) -> Subscription;
}

/// Profile table operations
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Read exactly one profile row
    async fn fetch_profile(&self, id: AccountId) -> Result<Profile, ProviderError>;

    /// Insert a profile row
    async fn insert_profile(&self, profile: &Profile) -> Result<(), ProviderError>;

    /// Apply a partial update and return the row as stored
    async fn update_profile(
        &self,
        id: AccountId,
        update: &ProfileUpdate,
    ) -> Result<Profile, ProviderError>;
}

/// Everything the synchronizer needs from a backend
pub trait Backend: AuthProvider + ProfileStore {}

impl<T: AuthProvider + ProfileStore + ?Sized> Backend for T {}

/// Provider-side sender of auth events
#[derive(Debug, Clone)]
pub struct AuthEventBus {
    sender: broadcast::Sender<AuthStateChange>,
}

impl AuthEventBus {
    /// Create a bus buffering up to `capacity` undelivered events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver an event to every live subscriber
    pub fn emit(&self, change: AuthStateChange) {
        let event = change.event;
        match self.sender.send(change) {
            Ok(receivers) => tracing::debug!(%event, receivers, "auth event emitted"),
            Err(_) => tracing::debug!(%event, "auth event emitted with no subscribers"),
        }
    }

    /// Register a new subscriber
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.sender.subscribe())
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuthEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Consumer handle on the auth event stream
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) stops delivery.
#[derive(Debug)]
pub struct Subscription {
    events: broadcast::Receiver<AuthStateChange>,
}

impl Subscription {
    /// Wrap a broadcast receiver
    #[must_use]
    pub fn new(events: broadcast::Receiver<AuthStateChange>) -> Self {
        Self { events }
    }

    /// Next event, or `None` once the provider has gone away
    ///
    /// A subscriber that falls behind skips the overwritten events.
    pub async fn next(&mut self) -> Option<AuthStateChange> {
        loop {
            match self.events.recv().await {
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "auth event subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving events
    pub fn unsubscribe(self) {
        drop(self);
    }
}
