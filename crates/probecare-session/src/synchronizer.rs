//! Session synchronizer
//!
//! Single source of truth for "who is the current actor":
//! - Restores a persisted session once at startup
//! - Follows the provider's auth event stream (sign-in, sign-out, refresh)
//! - Runs login/register/logout/profile-update on behalf of the application
//! - Publishes every state change on a watch channel
//!
//! Successful sign-in does not touch local state directly. The session and
//! profile are adopted when the provider's SIGNED_IN event arrives, so the
//! profile is fetched exactly once per sign-in.
//!
//! Credential operations and event handling are serialized on one async lock,
//! mirroring sequential event delivery. After [`SessionSynchronizer::dispose`]
//! every pending result is discarded instead of applied.

use crate::config::SyncConfig;
use crate::error::SessionError;
use crate::provider::{Backend, Subscription};
use crate::state::SynchronizerState;
use crate::state_machine::{validate_transition, Phase};
use crate::types::{
    AccountId, AuthEvent, AuthStateChange, Profile, ProfileDraft, ProfileUpdate, Registration,
    Role, Session,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};

/// Explicit, injectable holder of session and profile state
///
/// Construct with [`SessionSynchronizer::start`] at application start and
/// call [`SessionSynchronizer::dispose`] (or drop it) at the end.
pub struct SessionSynchronizer {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn Backend>,
    config: SyncConfig,
    state: RwLock<SynchronizerState>,
    published: watch::Sender<SynchronizerState>,
    torn_down: AtomicBool,
    shutdown: Notify,
    serial: Mutex<()>,
}

impl SessionSynchronizer {
    /// Subscribe to the provider's event stream and begin startup restore
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(backend: Arc<dyn Backend>, config: SyncConfig) -> Self {
        let initial = SynchronizerState::initializing();
        let (published, _) = watch::channel(initial.clone());

        // Subscribe before restoring so no event between the two is lost
        let subscription = backend.on_auth_state_change();

        let inner = Arc::new(Inner {
            backend,
            config,
            state: RwLock::new(initial),
            published,
            torn_down: AtomicBool::new(false),
            shutdown: Notify::new(),
            serial: Mutex::new(()),
        });

        tokio::spawn(Arc::clone(&inner).run(subscription));
        tracing::info!("session synchronizer started");

        Self { inner }
    }

    /// Sign in with email and password
    ///
    /// `Ok` carries the account the provider accepted. Local state becomes
    /// authenticated when the resulting SIGNED_IN event is handled, so callers
    /// that need the new account wait for it with [`SessionSynchronizer::wait_for`].
    pub async fn login(&self, email: &str, password: &str) -> Result<AccountId, SessionError> {
        let _serial = self.inner.serial.lock().await;
        self.inner.ensure_live()?;

        if email.trim().is_empty() || password.is_empty() {
            return Err(self
                .inner
                .fail_fast(SessionError::InvalidInput("email and password are required".into())));
        }

        self.inner.begin_operation();
        tracing::info!("signing in");

        match self.inner.backend.sign_in_with_password(email, password).await {
            Ok(session) => {
                let account = session.account_id();
                tracing::info!(%account, "sign-in accepted");
                self.inner.end_operation(None);
                Ok(account)
            }
            Err(e) => {
                tracing::warn!(error = %e, "sign-in rejected");
                let err = SessionError::Auth(e.to_string());
                self.inner.end_operation(Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Create an identity, then its profile row
    ///
    /// When the identity is created but the profile insert fails, the error is
    /// [`SessionError::RegistrationIncomplete`] and the identity stays behind.
    pub async fn register(&self, draft: ProfileDraft) -> Result<Registration, SessionError> {
        let _serial = self.inner.serial.lock().await;
        self.inner.ensure_live()?;

        if draft.name.trim().is_empty() || draft.email.trim().is_empty() || draft.password.is_empty()
        {
            return Err(self.inner.fail_fast(SessionError::InvalidInput(
                "name, email and password are required".into(),
            )));
        }

        self.inner.begin_operation();
        tracing::info!(role = %draft.role, "registering account");

        let identity = match self.inner.backend.sign_up(&draft.email, &draft.password).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "sign-up rejected");
                let err = SessionError::Auth(e.to_string());
                self.inner.end_operation(Some(err.clone()));
                return Err(err);
            }
        };

        let profile = draft.to_profile(identity.id);
        match self.inner.backend.insert_profile(&profile).await {
            Ok(()) => {
                tracing::info!(account = %identity.id, "account registered");
                self.inner.end_operation(None);
                Ok(Registration {
                    account: identity.id,
                    signed_in: identity.session.is_some(),
                })
            }
            Err(e) => {
                tracing::error!(
                    account = %identity.id,
                    error = %e,
                    "profile insert failed after sign-up; identity has no profile"
                );
                let err = SessionError::RegistrationIncomplete {
                    account: identity.id,
                    reason: e.to_string(),
                };
                self.inner.end_operation(Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Ask the provider to end the session
    ///
    /// Local state is cleared by the resulting SIGNED_OUT event, not here.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let _serial = self.inner.serial.lock().await;
        self.inner.ensure_live()?;

        self.inner.begin_operation();
        tracing::info!("signing out");

        match self.inner.backend.sign_out().await {
            Ok(()) => {
                self.inner.end_operation(None);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "sign-out failed");
                let err = SessionError::Auth(e.to_string());
                self.inner.end_operation(Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Partially update the current profile
    ///
    /// The cached profile is replaced with the row the server returns, never
    /// merged locally.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, SessionError> {
        let _serial = self.inner.serial.lock().await;
        self.inner.ensure_live()?;
        self.inner.mutate(|s| s.error = None);

        let Some(account) = self.inner.current_account() else {
            return Err(self.inner.fail_fast(SessionError::NotAuthenticated));
        };
        if update.is_empty() {
            return Err(self
                .inner
                .fail_fast(SessionError::InvalidInput("no profile fields to update".into())));
        }

        match self.inner.backend.update_profile(account, &update).await {
            Ok(profile) => {
                tracing::info!(%account, "profile updated");
                let stored = profile.clone();
                self.inner.mutate(move |s| {
                    if session_account(s) == Some(stored.id) {
                        s.profile = Some(stored);
                    }
                });
                Ok(profile)
            }
            Err(e) => {
                tracing::warn!(%account, error = %e, "profile update rejected");
                Err(self.inner.fail_fast(SessionError::ProfileWrite(e.to_string())))
            }
        }
    }

    /// True only when a profile is cached and carries `role`
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.inner.state.read().has_role(role)
    }

    /// Reset the error; nothing else changes
    pub fn clear_error(&self) {
        self.inner.mutate(|s| s.error = None);
    }

    /// Copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> SynchronizerState {
        self.inner.state.read().clone()
    }

    /// Receiver that sees every published state
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SynchronizerState> {
        self.inner.published.subscribe()
    }

    /// Wait until the published state satisfies `predicate`
    ///
    /// Never resolves if the state stops changing; bound it with a timeout.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SynchronizerState, SessionError>
    where
        F: FnMut(&SynchronizerState) -> bool,
    {
        let mut rx = self.subscribe();
        let state = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| SessionError::Disposed)?;
        Ok(state.clone())
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.state.read().phase()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.read().is_authenticated()
    }

    /// Profile name, else session email, else the configured fallback
    #[must_use]
    pub fn display_name(&self) -> String {
        let state = self.inner.state.read();
        state
            .display_name(&self.inner.config.display_name_fallback)
            .to_string()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }

    /// Stop following the event stream and freeze state
    ///
    /// Results of calls still in flight are dropped when they arrive.
    pub fn dispose(&self) {
        {
            let _state = self.inner.state.write();
            if self.inner.torn_down.swap(true, Ordering::SeqCst) {
                return;
            }
        }
        self.inner.shutdown.notify_one();
        tracing::info!("session synchronizer disposed");
    }
}

impl Drop for SessionSynchronizer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SessionSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSynchronizer")
            .field("state", &*self.inner.state.read())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

fn session_account(state: &SynchronizerState) -> Option<AccountId> {
    state.session.as_ref().map(Session::account_id)
}

impl Inner {
    async fn run(self: Arc<Self>, mut subscription: Subscription) {
        self.restore().await;

        loop {
            if self.torn_down.load(Ordering::SeqCst) {
                break;
            }
            let next = tokio::select! {
                () = self.shutdown.notified() => break,
                next = subscription.next() => next,
            };
            let Some(change) = next else {
                tracing::info!("auth event stream closed");
                break;
            };
            self.handle_event(change).await;
        }

        subscription.unsubscribe();
        tracing::debug!("auth event listener stopped");
    }

    async fn restore(&self) {
        let _serial = self.serial.lock().await;

        match self.backend.get_session().await {
            Ok(Some(session)) => {
                tracing::info!(account = %session.account_id(), "restored session");
                self.adopt_session(session, true).await;
            }
            Ok(None) => tracing::debug!("no session to restore"),
            Err(e) => {
                tracing::warn!(error = %e, "session restore failed");
                self.mutate(|s| s.error = Some(SessionError::Auth(e.to_string())));
            }
        }

        self.mutate(|s| s.restoring = false);
    }

    async fn handle_event(&self, change: AuthStateChange) {
        let _serial = self.serial.lock().await;
        if self.torn_down.load(Ordering::SeqCst) {
            return;
        }

        tracing::debug!(
            event = %change.event,
            email = change.session.as_ref().map(Session::email),
            "auth state changed"
        );

        match (change.event, change.session) {
            (AuthEvent::SignedOut, _) => {
                self.mutate(|s| {
                    s.session = None;
                    s.profile = None;
                });
            }
            (AuthEvent::SignedIn, Some(session)) => {
                self.adopt_session(session, self.config.refetch_profile_on_sign_in)
                    .await;
            }
            (AuthEvent::TokenRefreshed, Some(session)) => {
                self.adopt_session(session, false).await;
            }
            (event, None) => tracing::warn!(%event, "auth event without session ignored"),
        }
    }

    /// Replace the cached session, then load the profile unless one for the
    /// same account is already cached
    async fn adopt_session(&self, session: Session, force_fetch: bool) {
        let account = session.account_id();
        let mut needs_profile = force_fetch;

        self.mutate(|s| {
            let cached = s.profile.as_ref().is_some_and(|p| p.id == account);
            if !cached {
                s.profile = None;
                needs_profile = true;
            }
            s.session = Some(session);
        });

        if needs_profile {
            self.load_profile(account).await;
        }
    }

    async fn load_profile(&self, account: AccountId) {
        match self.backend.fetch_profile(account).await {
            Ok(profile) => {
                let applied = self.mutate(|s| {
                    if session_account(s) == Some(profile.id) {
                        s.profile = Some(profile);
                    } else {
                        tracing::debug!(%account, "profile belongs to a replaced session; dropped");
                    }
                });
                if !applied {
                    tracing::warn!(%account, "profile arrived after teardown; discarded");
                }
            }
            Err(e) => {
                tracing::error!(%account, error = %e, "profile fetch failed");
                self.mutate(|s| {
                    if s.error.is_none() {
                        s.error = Some(SessionError::ProfileFetch(e.to_string()));
                    }
                });
            }
        }
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.torn_down.load(Ordering::SeqCst) {
            Err(SessionError::Disposed)
        } else {
            Ok(())
        }
    }

    fn current_account(&self) -> Option<AccountId> {
        session_account(&self.state.read())
    }

    fn begin_operation(&self) {
        self.mutate(|s| {
            s.error = None;
            s.pending += 1;
        });
    }

    fn end_operation(&self, error: Option<SessionError>) {
        self.mutate(|s| {
            s.pending = s.pending.saturating_sub(1);
            if let Some(error) = error {
                s.error = Some(error);
            }
        });
    }

    /// Record an error that stopped an operation before any external call
    fn fail_fast(&self, error: SessionError) -> SessionError {
        let recorded = error.clone();
        self.mutate(move |s| s.error = Some(recorded));
        error
    }

    /// Apply `f` and publish, unless torn down. Returns whether it applied.
    fn mutate<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut SynchronizerState),
    {
        let mut state = self.state.write();
        if self.torn_down.load(Ordering::SeqCst) {
            return false;
        }

        let before = state.phase();
        f(&mut state);
        state.refresh_loading();
        let after = state.phase();

        if before != after {
            match validate_transition(before, after) {
                Ok(()) => tracing::debug!(?before, ?after, "phase changed"),
                Err(e) => tracing::warn!(error = %e, "unexpected phase change"),
            }
        }

        self.published.send_replace(state.clone());
        true
    }
}
