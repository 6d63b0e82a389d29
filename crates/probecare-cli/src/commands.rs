//! Command implementations
//!
//! Each command drives a freshly started synchronizer (or the REST backend for
//! leaf calls) and returns the text to print. Waits on the synchronizer are
//! bounded by the caller's timeout.

use anyhow::{anyhow, bail, Context, Result};
use probecare_backend::{ClientRecord, NewClient, RestBackend};
use probecare_session::{
    AccountId, AuthProvider, Phase, ProfileDraft, ProfileUpdate, Registration, Session,
    SessionSynchronizer, SynchronizerState,
};
use std::path::Path;
use std::time::Duration;

/// Wait for the synchronizer to reach a state, failing after `limit`
async fn settle_on<F>(
    sync: &SessionSynchronizer,
    limit: Duration,
    what: &str,
    predicate: F,
) -> Result<SynchronizerState>
where
    F: FnMut(&SynchronizerState) -> bool,
{
    tokio::time::timeout(limit, sync.wait_for(predicate))
        .await
        .map_err(|_| anyhow!("timed out after {}s waiting for {what}", limit.as_secs()))?
        .map_err(Into::into)
}

/// Startup restore finished and, when signed in, the profile fetch resolved
fn reconciled(state: &SynchronizerState) -> bool {
    if state.loading || state.phase() == Phase::Initializing {
        return false;
    }
    state.session.is_none() || state.profile.is_some() || state.error.is_some()
}

fn session_account(state: &SynchronizerState) -> Option<AccountId> {
    state.session.as_ref().map(Session::account_id)
}

/// `account` is the adopted session and its profile fetch resolved
fn signed_in_as(state: &SynchronizerState, account: AccountId) -> bool {
    session_account(state) == Some(account) && reconciled(state)
}

fn describe(state: &SynchronizerState, fallback: &str) -> String {
    let Some(session) = &state.session else {
        return "Not signed in".to_string();
    };
    let mut out = format!("{} <{}>", state.display_name(fallback), session.email());
    match (&state.profile, &state.error) {
        (Some(profile), _) => out.push_str(&format!(" [{}]", profile.role)),
        (None, Some(error)) => out.push_str(&format!("\n  profile unavailable: {error}")),
        (None, None) => {}
    }
    out
}

pub async fn login(
    sync: &SessionSynchronizer,
    email: &str,
    password: &str,
    fallback: &str,
    limit: Duration,
) -> Result<String> {
    settle_on(sync, limit, "session restore", reconciled).await?;
    let account = sync.login(email, password).await.context("login failed")?;

    let state = settle_on(sync, limit, "profile", |s| signed_in_as(s, account)).await?;
    Ok(format!("Signed in as {}", describe(&state, fallback)))
}

pub async fn register(
    sync: &SessionSynchronizer,
    draft: ProfileDraft,
    limit: Duration,
) -> Result<String> {
    settle_on(sync, limit, "session restore", reconciled).await?;
    let email = draft.email.clone();
    let Registration { account, signed_in } = sync
        .register(draft)
        .await
        .context("registration failed")?;

    if signed_in {
        settle_on(sync, limit, "new account's session", |s| signed_in_as(s, account)).await?;
        Ok(format!("Registered and signed in as {email} ({account})"))
    } else {
        Ok(format!(
            "Registered {email} ({account}); confirm the address before signing in"
        ))
    }
}

pub async fn whoami(sync: &SessionSynchronizer, fallback: &str, limit: Duration) -> Result<String> {
    let state = settle_on(sync, limit, "session restore", reconciled).await?;
    Ok(describe(&state, fallback))
}

pub async fn logout(sync: &SessionSynchronizer, limit: Duration) -> Result<String> {
    settle_on(sync, limit, "session restore", reconciled).await?;
    if !sync.is_authenticated() {
        return Ok("Not signed in".to_string());
    }
    sync.logout().await.context("logout failed")?;
    settle_on(sync, limit, "sign-out", |s| s.session.is_none()).await?;
    Ok("Signed out".to_string())
}

pub async fn update_profile(
    sync: &SessionSynchronizer,
    update: ProfileUpdate,
    limit: Duration,
) -> Result<String> {
    settle_on(sync, limit, "session restore", reconciled).await?;
    let profile = sync
        .update_profile(update)
        .await
        .context("profile update failed")?;
    Ok(format!(
        "Profile updated: {} <{}> [{}]",
        profile.name, profile.email, profile.role
    ))
}

fn format_clients(clients: &[ClientRecord]) -> String {
    if clients.is_empty() {
        return "No clients".to_string();
    }
    clients
        .iter()
        .map(|c| format!("{}\t{}\t{}", c.id, c.name, c.phone))
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn list_clients(backend: &RestBackend) -> Result<String> {
    let Some(session) = backend.get_session().await? else {
        bail!("not signed in; run `probecare login` first");
    };
    let clients = backend.list_clients(session.account_id()).await?;
    Ok(format_clients(&clients))
}

pub async fn add_client(backend: &RestBackend, name: &str, phone: &str) -> Result<String> {
    let client = NewClient::new(name, phone)?;
    if backend.get_session().await?.is_none() {
        bail!("not signed in; run `probecare login` first");
    }
    let record = backend.add_client(&client).await?;
    Ok(format!("Added client {} ({})", record.name, record.id))
}

pub async fn upload(backend: &RestBackend, kind: &str, file: &Path) -> Result<String> {
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("{} has no usable file name", file.display()))?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;
    if backend.get_session().await?.is_none() {
        bail!("not signed in; run `probecare login` first");
    }
    let key = backend.upload_file(kind, file_name, bytes).await?;
    Ok(format!("Uploaded {} as {key}", file.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use probecare_backend::RecordId;
    use probecare_session::{Role, SyncConfig};
    use probecare_test_utils::{engineer_draft, InMemoryBackend};
    use std::sync::Arc;

    const LIMIT: Duration = Duration::from_secs(2);

    fn start(backend: &Arc<InMemoryBackend>) -> SessionSynchronizer {
        SessionSynchronizer::start(backend.clone(), SyncConfig::new())
    }

    #[tokio::test]
    async fn whoami_without_session() {
        let backend = Arc::new(InMemoryBackend::new());
        let sync = start(&backend);
        assert_eq!(whoami(&sync, "User", LIMIT).await.unwrap(), "Not signed in");
    }

    #[tokio::test]
    async fn login_reports_name_and_role() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_user("Eva", "eva@probecare.io", "probe-secret", Role::Engineer);
        let sync = start(&backend);

        let out = login(&sync, "eva@probecare.io", "probe-secret", "User", LIMIT)
            .await
            .unwrap();
        assert_eq!(out, "Signed in as Eva <eva@probecare.io> [ENGINEER]");
    }

    #[tokio::test]
    async fn login_over_restored_session_reports_new_account() {
        for _ in 0..20 {
            let backend = Arc::new(InMemoryBackend::new());
            backend.add_user("Eva", "eva@probecare.io", "probe-secret", Role::Engineer);
            backend.add_user("Victor", "victor@probecare.io", "probe-secret", Role::Sales);
            backend.seed_session("eva@probecare.io");
            let sync = start(&backend);

            let out = login(&sync, "victor@probecare.io", "probe-secret", "User", LIMIT)
                .await
                .unwrap();
            assert_eq!(out, "Signed in as Victor <victor@probecare.io> [SALES]");
            sync.dispose();
        }
    }

    #[tokio::test]
    async fn bad_login_is_an_error() {
        let backend = Arc::new(InMemoryBackend::new());
        let sync = start(&backend);

        let err = login(&sync, "eva@probecare.io", "nope", "User", LIMIT)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Invalid login credentials"));
    }

    #[tokio::test]
    async fn whoami_after_restore() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_user("Eva", "eva@probecare.io", "probe-secret", Role::Sales);
        backend.seed_session("eva@probecare.io");
        let sync = start(&backend);

        assert_eq!(
            whoami(&sync, "User", LIMIT).await.unwrap(),
            "Eva <eva@probecare.io> [SALES]"
        );
    }

    #[tokio::test]
    async fn register_mentions_confirmation_when_needed() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_auto_confirm(false);
        let sync = start(&backend);

        let out = register(&sync, engineer_draft("new@probecare.io"), LIMIT)
            .await
            .unwrap();
        assert!(out.contains("confirm the address"));
    }

    #[tokio::test]
    async fn register_over_restored_session_waits_for_new_account() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_user("Eva", "eva@probecare.io", "probe-secret", Role::Engineer);
        backend.seed_session("eva@probecare.io");
        let sync = start(&backend);

        let out = register(&sync, engineer_draft("new@probecare.io"), LIMIT)
            .await
            .unwrap();
        assert!(out.starts_with("Registered and signed in as new@probecare.io"));

        let new_account = backend.account_id("new@probecare.io");
        assert_eq!(session_account(&sync.snapshot()), new_account);
    }

    #[tokio::test]
    async fn logout_when_signed_out_is_a_no_op() {
        let backend = Arc::new(InMemoryBackend::new());
        let sync = start(&backend);

        assert_eq!(logout(&sync, LIMIT).await.unwrap(), "Not signed in");
        assert_eq!(backend.calls().sign_out, 0);
    }

    #[tokio::test]
    async fn update_requires_session() {
        let backend = Arc::new(InMemoryBackend::new());
        let sync = start(&backend);

        let err = update_profile(&sync, ProfileUpdate::default().with_name("X"), LIMIT)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("not authenticated"));
    }

    #[test]
    fn clients_are_tab_separated() {
        let owner = AccountId::new();
        let clients = vec![
            ClientRecord {
                id: RecordId::Number(1),
                name: "Acme".into(),
                phone: "555".into(),
                owner,
            },
            ClientRecord {
                id: RecordId::Number(2),
                name: "Globex".into(),
                phone: "556".into(),
                owner,
            },
        ];
        assert_eq!(format_clients(&clients), "1\tAcme\t555\n2\tGlobex\t556");
        assert_eq!(format_clients(&[]), "No clients");
    }
}
