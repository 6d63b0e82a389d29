//! Functional tests for the session synchronizer against the in-memory backend.
//!
//! These pin down the reconciliation rules:
//! - local state follows the provider's event stream, not call return paths
//! - profiles mirror what the server stores
//! - nothing is applied after teardown

use pretty_assertions::assert_eq;
use probecare_session::{
    AuthStateChange, Phase, ProfileUpdate, ProviderError, Role, SessionError, SessionSynchronizer,
    SyncConfig,
};
use probecare_test_utils::{
    engineer_draft, sales_draft, settle, wait_until, InMemoryBackend, Operation,
};
use std::sync::Arc;
use std::time::Duration;

const PASSWORD: &str = "probe-secret";

fn start(backend: &Arc<InMemoryBackend>) -> SessionSynchronizer {
    SessionSynchronizer::start(backend.clone(), SyncConfig::default())
}

#[tokio::test]
async fn starts_unauthenticated_without_persisted_session() {
    let backend = Arc::new(InMemoryBackend::new());
    let sync = start(&backend);

    let state = settle(&sync).await;
    assert_eq!(state.phase(), Phase::Unauthenticated);
    assert_eq!(state.error, None);
    assert!(!sync.is_authenticated());
    assert_eq!(sync.display_name(), "User");
}

#[tokio::test]
async fn restores_persisted_session_and_loads_profile() {
    let backend = Arc::new(InMemoryBackend::new());
    let profile = backend.add_user("Eva", "eva@probecare.io", PASSWORD, Role::Engineer);
    backend.seed_session("eva@probecare.io");

    let sync = start(&backend);
    let state = wait_until(&sync, "restored profile", |s| {
        !s.loading && s.profile.is_some()
    })
    .await;

    assert_eq!(state.phase(), Phase::Authenticated);
    assert_eq!(state.profile, Some(profile.clone()));
    assert_eq!(
        state.session.as_ref().map(|s| s.account_id()),
        Some(profile.id)
    );
    assert!(sync.has_role(Role::Engineer));
    assert_eq!(sync.display_name(), "Eva");
}

#[tokio::test]
async fn login_authenticates_through_the_event_stream() {
    let backend = Arc::new(InMemoryBackend::new());
    let profile = backend.add_user("Victor", "victor@probecare.io", PASSWORD, Role::Sales);
    let sync = start(&backend);
    settle(&sync).await;

    sync.login("victor@probecare.io", PASSWORD).await.unwrap();

    let state = wait_until(&sync, "profile after login", |s| s.profile.is_some()).await;
    assert_eq!(state.profile, Some(profile));
    assert!(state.is_sales());
    assert_eq!(state.error, None);
    assert_eq!(backend.calls().fetch_profile, 1, "profile fetched exactly once");
}

#[tokio::test]
async fn rejected_login_leaves_state_unauthenticated() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_user("Victor", "victor@probecare.io", PASSWORD, Role::Sales);
    let sync = start(&backend);
    settle(&sync).await;

    let err = sync
        .login("victor@probecare.io", "wrong")
        .await
        .unwrap_err();

    assert_eq!(err, SessionError::Auth("Invalid login credentials".into()));
    let state = sync.snapshot();
    assert_eq!(state.phase(), Phase::Unauthenticated);
    assert_eq!(state.error, Some(err));
    assert_eq!(backend.calls().fetch_profile, 0);
}

#[tokio::test]
async fn next_operation_clears_previous_error() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_user("Victor", "victor@probecare.io", PASSWORD, Role::Sales);
    let sync = start(&backend);
    settle(&sync).await;

    assert!(sync.login("victor@probecare.io", "wrong").await.is_err());
    assert!(sync.snapshot().error.is_some());

    sync.login("victor@probecare.io", PASSWORD).await.unwrap();
    assert_eq!(sync.snapshot().error, None);
}

#[tokio::test]
async fn logout_clears_session_and_profile_once_event_arrives() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_user("Eva", "eva@probecare.io", PASSWORD, Role::Engineer);
    backend.seed_session("eva@probecare.io");
    let sync = start(&backend);
    wait_until(&sync, "restored profile", |s| s.profile.is_some()).await;

    sync.logout().await.unwrap();

    let state = wait_until(&sync, "signed out", |s| s.session.is_none()).await;
    assert_eq!(state.profile, None);
    assert_eq!(state.phase(), Phase::Unauthenticated);
    assert!(!sync.has_role(Role::Engineer));
}

#[tokio::test]
async fn failed_logout_keeps_session() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_user("Eva", "eva@probecare.io", PASSWORD, Role::Engineer);
    backend.seed_session("eva@probecare.io");
    let sync = start(&backend);
    wait_until(&sync, "restored profile", |s| s.profile.is_some()).await;

    backend.fail(Operation::SignOut, ProviderError::Transport("offline".into()));
    assert!(sync.logout().await.is_err());

    let state = sync.snapshot();
    assert!(state.is_authenticated());
    assert!(state.profile.is_some());
    assert!(matches!(state.error, Some(SessionError::Auth(_))));
}

#[tokio::test]
async fn terminal_state_follows_last_operation() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_user("Eva", "eva@probecare.io", PASSWORD, Role::Engineer);
    let victor = backend.add_user("Victor", "victor@probecare.io", PASSWORD, Role::Sales);
    let sync = start(&backend);
    settle(&sync).await;

    // Fire the whole sequence without waiting for events in between
    sync.login("eva@probecare.io", PASSWORD).await.unwrap();
    sync.logout().await.unwrap();
    sync.login("victor@probecare.io", PASSWORD).await.unwrap();

    let state = wait_until(&sync, "victor's profile", |s| {
        s.profile.as_ref().is_some_and(|p| p.id == victor.id)
    })
    .await;
    assert_eq!(state.session.as_ref().map(|s| s.account_id()), Some(victor.id));
    assert!(sync.has_role(Role::Sales));
    assert!(!sync.has_role(Role::Engineer));

    // Same outcome when each step is allowed to settle
    sync.logout().await.unwrap();
    wait_until(&sync, "signed out", |s| s.session.is_none()).await;
    sync.login("victor@probecare.io", PASSWORD).await.unwrap();
    let settled = wait_until(&sync, "victor again", |s| s.profile.is_some()).await;

    assert_eq!(settled.profile, state.profile);
    assert_eq!(settled.phase(), state.phase());
}

#[tokio::test]
async fn update_profile_mirrors_server_row() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_user("Eva", "Eva@ProbeCare.io", PASSWORD, Role::Engineer);
    backend.seed_session("Eva@ProbeCare.io");
    backend.set_update_normalizer(|mut row| {
        row.email = row.email.to_lowercase();
        row
    });
    let sync = start(&backend);
    let before = wait_until(&sync, "restored profile", |s| s.profile.is_some()).await;

    let returned = sync
        .update_profile(ProfileUpdate::new().with_name("X"))
        .await
        .unwrap();

    let cached = sync.snapshot().profile.unwrap();
    assert_eq!(cached, returned);
    assert_eq!(Some(cached.clone()), backend.profile(cached.id));
    assert_eq!(cached.name, "X");
    assert_eq!(cached.email, "eva@probecare.io");
    assert_ne!(cached.email, before.profile.unwrap().email);
}

#[tokio::test]
async fn rejected_update_keeps_cached_profile() {
    let backend = Arc::new(InMemoryBackend::new());
    let profile = backend.add_user("Eva", "eva@probecare.io", PASSWORD, Role::Engineer);
    backend.seed_session("eva@probecare.io");
    let sync = start(&backend);
    wait_until(&sync, "restored profile", |s| s.profile.is_some()).await;

    backend.fail(
        Operation::UpdateProfile,
        ProviderError::rejected("permission denied for table users"),
    );
    let err = sync
        .update_profile(ProfileUpdate::new().with_role(Role::Sales))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::ProfileWrite(_)));
    let state = sync.snapshot();
    assert_eq!(state.profile, Some(profile));
    assert_eq!(state.error, Some(err));
}

#[tokio::test]
async fn update_requires_session() {
    let backend = Arc::new(InMemoryBackend::new());
    let sync = start(&backend);
    settle(&sync).await;

    let err = sync
        .update_profile(ProfileUpdate::new().with_name("X"))
        .await
        .unwrap_err();

    assert_eq!(err, SessionError::NotAuthenticated);
    assert_eq!(backend.calls().update_profile, 0);
}

#[tokio::test]
async fn register_creates_identity_and_profile() {
    let backend = Arc::new(InMemoryBackend::new());
    let sync = start(&backend);
    settle(&sync).await;

    let registration = sync
        .register(engineer_draft("nueva@probecare.io"))
        .await
        .unwrap();
    assert!(registration.signed_in);
    let account = registration.account;

    let stored = backend.profile(account).expect("profile row inserted");
    assert_eq!(stored.role, Role::Engineer);
    assert_eq!(stored.email, "nueva@probecare.io");

    let state = wait_until(&sync, "profile after sign-up", |s| s.profile.is_some()).await;
    assert_eq!(state.profile, Some(stored));
    assert_eq!(state.error, None);
    assert!(sync.has_role(Role::Engineer));
}

#[tokio::test]
async fn register_without_auto_confirm_stays_signed_out() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.set_auto_confirm(false);
    let sync = start(&backend);
    settle(&sync).await;

    let registration = sync.register(sales_draft("pending@probecare.io")).await.unwrap();
    assert!(!registration.signed_in);
    let account = registration.account;

    assert!(backend.profile(account).is_some());
    let state = sync.snapshot();
    assert!(!state.is_authenticated());
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn duplicate_registration_is_an_auth_error() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_user("Eva", "eva@probecare.io", PASSWORD, Role::Engineer);
    let sync = start(&backend);
    settle(&sync).await;

    let err = sync.register(engineer_draft("eva@probecare.io")).await.unwrap_err();

    assert_eq!(err, SessionError::Auth("User already registered".into()));
    assert_eq!(backend.calls().insert_profile, 0);
}

#[tokio::test]
async fn failed_profile_insert_leaves_identity_without_profile() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.fail(
        Operation::InsertProfile,
        ProviderError::rejected("new row violates row-level security policy"),
    );
    let sync = start(&backend);
    settle(&sync).await;

    let err = sync
        .register(engineer_draft("orphan@probecare.io"))
        .await
        .unwrap_err();
    assert!(err.is_orphaned_identity());
    assert!(backend.account_id("orphan@probecare.io").is_some());

    let state = wait_until(&sync, "session from sign-up", |s| s.session.is_some()).await;
    assert_eq!(state.profile, None);
    assert!(state.error.is_some());
    assert!(!sync.has_role(Role::Engineer));
    assert!(matches!(
        sync.snapshot().error,
        Some(SessionError::RegistrationIncomplete { .. })
    ));
}

#[tokio::test]
async fn token_refresh_replaces_session_without_refetching() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_user("Eva", "eva@probecare.io", PASSWORD, Role::Engineer);
    let original = backend.seed_session("eva@probecare.io");
    let sync = start(&backend);
    wait_until(&sync, "restored profile", |s| s.profile.is_some()).await;
    let fetches = backend.calls().fetch_profile;

    let refreshed = backend.refresh_token();
    assert_ne!(refreshed.access_token, original.access_token);

    let state = wait_until(&sync, "refreshed session", |s| {
        s.session.as_ref() == Some(&refreshed)
    })
    .await;
    assert!(state.profile.is_some());
    assert_eq!(backend.calls().fetch_profile, fetches);
}

#[tokio::test]
async fn sign_in_for_cached_account_refetches_when_configured() {
    let backend = Arc::new(InMemoryBackend::new());
    let profile = backend.add_user("Eva", "eva@probecare.io", PASSWORD, Role::Engineer);
    let session = backend.seed_session("eva@probecare.io");
    let sync = SessionSynchronizer::start(
        backend.clone(),
        SyncConfig::new().with_refetch_on_sign_in(true),
    );
    wait_until(&sync, "restored profile", |s| s.profile.is_some()).await;
    let fetches = backend.calls().fetch_profile;

    backend.emit(AuthStateChange::signed_in(session));

    tokio::time::timeout(Duration::from_secs(2), async {
        while backend.calls().fetch_profile == fetches {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("profile was not fetched again");

    let state = settle(&sync).await;
    assert_eq!(backend.calls().fetch_profile, fetches + 1);
    assert_eq!(state.profile, Some(profile));
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn sign_in_for_cached_account_keeps_profile_by_default() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_user("Eva", "eva@probecare.io", PASSWORD, Role::Engineer);
    let session = backend.seed_session("eva@probecare.io");
    let sync = start(&backend);
    wait_until(&sync, "restored profile", |s| !s.loading && s.profile.is_some()).await;
    let fetches = backend.calls().fetch_profile;

    let mut observer = sync.subscribe();
    observer.borrow_and_update();
    backend.emit(AuthStateChange::signed_in(session));
    tokio::time::timeout(Duration::from_secs(2), observer.changed())
        .await
        .expect("sign-in was not handled")
        .unwrap();

    assert!(sync.snapshot().profile.is_some());
    assert_eq!(backend.calls().fetch_profile, fetches);
}

#[tokio::test]
async fn external_sign_in_for_new_account_loads_its_profile() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_user("Eva", "eva@probecare.io", PASSWORD, Role::Engineer);
    let victor = backend.add_user("Victor", "victor@probecare.io", PASSWORD, Role::Sales);
    backend.seed_session("eva@probecare.io");
    let sync = start(&backend);
    wait_until(&sync, "restored profile", |s| s.profile.is_some()).await;

    // Another tab signs in as somebody else
    let other = backend.seed_session("victor@probecare.io");
    backend.emit(AuthStateChange::signed_in(other));

    let state = wait_until(&sync, "victor's profile", |s| {
        s.profile.as_ref().is_some_and(|p| p.id == victor.id)
    })
    .await;
    assert!(state.is_sales());
    assert_eq!(state.display_name("User"), "Victor");
}

#[tokio::test]
async fn missing_profile_row_is_reported() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_account("ghost@probecare.io", PASSWORD);
    let sync = start(&backend);
    settle(&sync).await;

    sync.login("ghost@probecare.io", PASSWORD).await.unwrap();

    let state = wait_until(&sync, "fetch error", |s| s.error.is_some()).await;
    assert!(state.is_authenticated());
    assert_eq!(state.profile, None);
    assert!(matches!(state.error, Some(SessionError::ProfileFetch(_))));
    assert_eq!(sync.display_name(), "ghost@probecare.io");
}

#[tokio::test]
async fn late_profile_is_discarded_after_teardown() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_user("Eva", "eva@probecare.io", PASSWORD, Role::Engineer);
    backend.seed_session("eva@probecare.io");
    backend.hold_profile_fetches();

    let sync = start(&backend);
    tokio::time::timeout(Duration::from_secs(2), backend.wait_for_held_fetch())
        .await
        .expect("restore never fetched the profile");

    sync.dispose();
    let frozen = sync.snapshot();
    let mut observer = sync.subscribe();
    observer.borrow_and_update();

    backend.release_profile_fetches();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(sync.snapshot(), frozen);
    assert_eq!(frozen.profile, None);
    assert!(!observer.has_changed().unwrap());
}

#[tokio::test]
async fn events_after_teardown_are_ignored() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_user("Eva", "eva@probecare.io", PASSWORD, Role::Engineer);
    let sync = start(&backend);
    settle(&sync).await;

    sync.dispose();
    let session = backend.seed_session("eva@probecare.io");
    backend.emit(AuthStateChange::signed_in(session));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!sync.is_authenticated());
    assert_eq!(
        sync.login("eva@probecare.io", PASSWORD).await.unwrap_err(),
        SessionError::Disposed
    );
}

#[tokio::test]
async fn configured_fallback_names_anonymous_users() {
    let backend = Arc::new(InMemoryBackend::new());
    let sync = SessionSynchronizer::start(
        backend.clone(),
        SyncConfig::new().with_display_name_fallback("Usuario"),
    );
    settle(&sync).await;

    assert_eq!(sync.display_name(), "Usuario");
}
