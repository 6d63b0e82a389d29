//! Testing utilities for the ProbeCare workspace
//!
//! An in-memory backend standing in for the hosted provider, plus fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use probecare_session::{
    AccountId, AuthEventBus, AuthProvider, AuthStateChange, Identity, Profile, ProfileDraft,
    ProfileStore, ProfileUpdate, ProviderError, Role, Session, SessionSynchronizer, SessionUser,
    Subscription, SynchronizerState,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Backend calls that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SignIn,
    SignUp,
    SignOut,
    GetSession,
    FetchProfile,
    InsertProfile,
    UpdateProfile,
}

/// How many times each call reached the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub sign_in: usize,
    pub sign_up: usize,
    pub sign_out: usize,
    pub get_session: usize,
    pub fetch_profile: usize,
    pub insert_profile: usize,
    pub update_profile: usize,
}

#[derive(Debug, Default)]
struct Counters {
    sign_in: AtomicUsize,
    sign_up: AtomicUsize,
    sign_out: AtomicUsize,
    get_session: AtomicUsize,
    fetch_profile: AtomicUsize,
    insert_profile: AtomicUsize,
    update_profile: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> CallCounts {
        CallCounts {
            sign_in: self.sign_in.load(Ordering::SeqCst),
            sign_up: self.sign_up.load(Ordering::SeqCst),
            sign_out: self.sign_out.load(Ordering::SeqCst),
            get_session: self.get_session.load(Ordering::SeqCst),
            fetch_profile: self.fetch_profile.load(Ordering::SeqCst),
            insert_profile: self.insert_profile.load(Ordering::SeqCst),
            update_profile: self.update_profile.load(Ordering::SeqCst),
        }
    }
}

struct Account {
    id: AccountId,
    password: String,
}

#[derive(Default)]
struct Store {
    accounts: HashMap<String, Account>,
    profiles: HashMap<AccountId, Profile>,
    current: Option<Session>,
}

type Normalizer = Box<dyn Fn(Profile) -> Profile + Send + Sync>;

/// Hosted-provider stand-in with scripted failures and observable calls
pub struct InMemoryBackend {
    bus: AuthEventBus,
    store: Mutex<Store>,
    failures: Mutex<HashMap<Operation, ProviderError>>,
    normalizer: Mutex<Option<Normalizer>>,
    auto_confirm: AtomicBool,
    fetch_open: watch::Sender<bool>,
    fetch_entered: Notify,
    counters: Counters,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        let (fetch_open, _) = watch::channel(true);
        Self {
            bus: AuthEventBus::default(),
            store: Mutex::new(Store::default()),
            failures: Mutex::new(HashMap::new()),
            normalizer: Mutex::new(None),
            auto_confirm: AtomicBool::new(true),
            fetch_open,
            fetch_entered: Notify::new(),
            counters: Counters::default(),
        }
    }

    /// Create an account without a profile
    pub fn add_account(&self, email: &str, password: &str) -> AccountId {
        let id = AccountId::new();
        self.store.lock().accounts.insert(
            email.to_string(),
            Account {
                id,
                password: password.to_string(),
            },
        );
        id
    }

    /// Create an account and its profile row
    pub fn add_user(&self, name: &str, email: &str, password: &str, role: Role) -> Profile {
        let id = self.add_account(email, password);
        let profile = Profile {
            id,
            name: name.to_string(),
            email: email.to_string(),
            role,
        };
        self.store.lock().profiles.insert(id, profile.clone());
        profile
    }

    /// Make `email` the persisted session that startup restore will find
    ///
    /// # Panics
    /// Panics if the account does not exist.
    pub fn seed_session(&self, email: &str) -> Session {
        let mut store = self.store.lock();
        let id = store.accounts.get(email).map(|a| a.id).expect("unknown account");
        let session = issue_session(id, email);
        store.current = Some(session.clone());
        session
    }

    /// Whether sign-up hands back a session immediately (default `true`)
    pub fn set_auto_confirm(&self, auto_confirm: bool) {
        self.auto_confirm.store(auto_confirm, Ordering::SeqCst);
    }

    /// Make every call of `op` fail with `error` until cleared
    pub fn fail(&self, op: Operation, error: ProviderError) {
        self.failures.lock().insert(op, error);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Rewrite rows on update the way a server-side trigger would
    pub fn set_update_normalizer<F>(&self, f: F)
    where
        F: Fn(Profile) -> Profile + Send + Sync + 'static,
    {
        *self.normalizer.lock() = Some(Box::new(f));
    }

    /// Park profile fetches until [`InMemoryBackend::release_profile_fetches`]
    pub fn hold_profile_fetches(&self) {
        self.fetch_open.send_replace(false);
    }

    pub fn release_profile_fetches(&self) {
        self.fetch_open.send_replace(true);
    }

    /// Resolves once a fetch is parked on the hold
    pub async fn wait_for_held_fetch(&self) {
        self.fetch_entered.notified().await;
    }

    /// Deliver an arbitrary event, as another tab or device would
    pub fn emit(&self, change: AuthStateChange) {
        self.bus.emit(change);
    }

    /// Rotate the current session's token and announce it
    ///
    /// # Panics
    /// Panics if nobody is signed in.
    pub fn refresh_token(&self) -> Session {
        let session = {
            let mut store = self.store.lock();
            let current = store.current.as_ref().expect("no current session");
            let refreshed = issue_session(current.account_id(), current.email());
            store.current = Some(refreshed.clone());
            refreshed
        };
        self.bus.emit(AuthStateChange::token_refreshed(session.clone()));
        session
    }

    #[must_use]
    pub fn profile(&self, id: AccountId) -> Option<Profile> {
        self.store.lock().profiles.get(&id).cloned()
    }

    #[must_use]
    pub fn account_id(&self, email: &str) -> Option<AccountId> {
        self.store.lock().accounts.get(email).map(|a| a.id)
    }

    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.store.lock().current.clone()
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.counters.snapshot()
    }

    fn check(&self, op: Operation) -> Result<(), ProviderError> {
        match self.failures.lock().get(&op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn issue_session(id: AccountId, email: &str) -> Session {
    Session {
        access_token: uuid::Uuid::new_v4().to_string(),
        refresh_token: Some(uuid::Uuid::new_v4().to_string()),
        expires_at: Some(Utc::now() + ChronoDuration::hours(1)),
        user: SessionUser {
            id,
            email: email.to_string(),
        },
    }
}

#[async_trait]
impl AuthProvider for InMemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        self.counters.sign_in.fetch_add(1, Ordering::SeqCst);
        self.check(Operation::SignIn)?;

        let session = {
            let mut store = self.store.lock();
            let id = match store.accounts.get(email) {
                Some(account) if account.password == password => account.id,
                _ => {
                    return Err(ProviderError::Rejected {
                        status: Some(400),
                        message: "Invalid login credentials".to_string(),
                    })
                }
            };
            let session = issue_session(id, email);
            store.current = Some(session.clone());
            session
        };

        self.bus.emit(AuthStateChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, ProviderError> {
        self.counters.sign_up.fetch_add(1, Ordering::SeqCst);
        self.check(Operation::SignUp)?;

        let (id, session) = {
            let mut store = self.store.lock();
            if store.accounts.contains_key(email) {
                return Err(ProviderError::Rejected {
                    status: Some(422),
                    message: "User already registered".to_string(),
                });
            }
            let id = AccountId::new();
            store.accounts.insert(
                email.to_string(),
                Account {
                    id,
                    password: password.to_string(),
                },
            );
            let session = self
                .auto_confirm
                .load(Ordering::SeqCst)
                .then(|| issue_session(id, email));
            if let Some(session) = &session {
                store.current = Some(session.clone());
            }
            (id, session)
        };

        if let Some(session) = &session {
            self.bus.emit(AuthStateChange::signed_in(session.clone()));
        }
        Ok(Identity {
            id,
            email: email.to_string(),
            session,
        })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.counters.sign_out.fetch_add(1, Ordering::SeqCst);
        self.check(Operation::SignOut)?;

        self.store.lock().current = None;
        self.bus.emit(AuthStateChange::signed_out());
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        self.counters.get_session.fetch_add(1, Ordering::SeqCst);
        self.check(Operation::GetSession)?;
        Ok(self.store.lock().current.clone())
    }

    fn on_auth_state_change(&self) -> Subscription {
        self.bus.subscribe()
    }
}

#[async_trait]
impl ProfileStore for InMemoryBackend {
    async fn fetch_profile(&self, id: AccountId) -> Result<Profile, ProviderError> {
        self.counters.fetch_profile.fetch_add(1, Ordering::SeqCst);

        let mut open = self.fetch_open.subscribe();
        if !*open.borrow() {
            self.fetch_entered.notify_one();
        }
        // The sender lives as long as `self`, so this cannot fail
        let _ = open.wait_for(|open| *open).await;

        self.check(Operation::FetchProfile)?;
        self.store
            .lock()
            .profiles
            .get(&id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("profile {id}")))
    }

    async fn insert_profile(&self, profile: &Profile) -> Result<(), ProviderError> {
        self.counters.insert_profile.fetch_add(1, Ordering::SeqCst);
        self.check(Operation::InsertProfile)?;

        let mut store = self.store.lock();
        if store.profiles.contains_key(&profile.id) {
            return Err(ProviderError::Rejected {
                status: Some(409),
                message: "duplicate key value violates unique constraint \"users_pkey\""
                    .to_string(),
            });
        }
        store.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn update_profile(
        &self,
        id: AccountId,
        update: &ProfileUpdate,
    ) -> Result<Profile, ProviderError> {
        self.counters.update_profile.fetch_add(1, Ordering::SeqCst);
        self.check(Operation::UpdateProfile)?;

        let mut store = self.store.lock();
        let Some(row) = store.profiles.get(&id).cloned() else {
            return Err(ProviderError::NotFound(format!("profile {id}")));
        };

        let mut updated = row;
        if let Some(name) = &update.name {
            updated.name.clone_from(name);
        }
        if let Some(email) = &update.email {
            updated.email.clone_from(email);
        }
        if let Some(role) = update.role {
            updated.role = role;
        }
        if let Some(normalize) = self.normalizer.lock().as_ref() {
            updated = normalize(updated);
        }

        store.profiles.insert(id, updated.clone());
        Ok(updated)
    }
}

/// Registration draft for an engineer
#[must_use]
pub fn engineer_draft(email: &str) -> ProfileDraft {
    ProfileDraft::new("Eva Ingeniera", email, "probe-secret", Role::Engineer)
}

/// Registration draft for a sales rep
#[must_use]
pub fn sales_draft(email: &str) -> ProfileDraft {
    ProfileDraft::new("Victor Ventas", email, "probe-secret", Role::Sales)
}

/// Wait up to two seconds for the synchronizer to reach a state
///
/// # Panics
/// Panics on timeout, naming `what`.
pub async fn wait_until<F>(sync: &SessionSynchronizer, what: &str, predicate: F) -> SynchronizerState
where
    F: FnMut(&SynchronizerState) -> bool,
{
    match tokio::time::timeout(Duration::from_secs(2), sync.wait_for(predicate)).await {
        Ok(Ok(state)) => state,
        Ok(Err(e)) => panic!("synchronizer failed while waiting for {what}: {e}"),
        Err(_) => panic!("timed out waiting for {what}; state: {:?}", sync.snapshot()),
    }
}

/// Wait for startup restore and any credential operation to finish
pub async fn settle(sync: &SessionSynchronizer) -> SynchronizerState {
    wait_until(sync, "loading to finish", |s| !s.loading).await
}
