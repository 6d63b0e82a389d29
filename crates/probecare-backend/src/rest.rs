//! REST adapter for the hosted auth and data service
//!
//! Implements the synchronizer's capability traits:
//! - Password sign-in, sign-up, sign-out and token refresh on `/auth/v1`
//! - Profile reads and writes on `/rest/v1/<profile_table>`
//!
//! Every state change of the local session is announced on the auth event bus
//! and, when configured, persisted to the session file.

use crate::config::BackendConfig;
use crate::persist::SessionFile;
use crate::wire::{self, PasswordGrant, RefreshGrant, TokenResponse, SINGLE_OBJECT};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use probecare_session::{
    AccountId, AuthEventBus, AuthProvider, AuthStateChange, ConfigError, Identity, Profile,
    ProfileStore, ProfileUpdate, ProviderError, Session, Subscription,
};
use reqwest::{header, Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

/// Client for one hosted project
#[derive(Debug)]
pub struct RestBackend {
    http: Client,
    base: Url,
    config: BackendConfig,
    session: RwLock<Option<Session>>,
    bus: AuthEventBus,
    store: Option<SessionFile>,
}

impl RestBackend {
    /// Build a client; loads the persisted session if a session file is configured
    pub fn new(config: BackendConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let base = config.base_url()?;

        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "http",
                reason: e.to_string(),
            })?;

        let store = config.session_file.clone().map(SessionFile::new);
        let restored = match &store {
            Some(file) => match file.load() {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(path = %file.path().display(), error = %e, "ignoring unreadable session file");
                    None
                }
            },
            None => None,
        };
        if let Some(session) = &restored {
            tracing::debug!(account = %session.account_id(), "loaded persisted session");
        }

        Ok(Self {
            http,
            base,
            bus: AuthEventBus::new(config.event_capacity),
            config,
            session: RwLock::new(restored),
            store,
        })
    }

    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Session currently held, without refreshing it
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    /// Exchange the refresh token for a new session and announce it
    pub async fn refresh_session(&self) -> Result<Session, ProviderError> {
        let refresh_token = self
            .session
            .read()
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
            .ok_or(ProviderError::NotSignedIn)?;

        let url = self.endpoint(&["auth", "v1", "token"])?;
        let response = self
            .anonymous(self.http.post(url))
            .query(&[("grant_type", "refresh_token")])
            .json(&RefreshGrant {
                refresh_token: &refresh_token,
            })
            .send()
            .await
            .map_err(|e| wire::transport(&e))?;
        let grant: TokenResponse = read_json(response).await?;
        let session = grant.into_session(Utc::now());

        tracing::info!(account = %session.account_id(), "session refreshed");
        self.replace_session(Some(session.clone()));
        self.bus
            .emit(AuthStateChange::token_refreshed(session.clone()));
        Ok(session)
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// URL under the project base, one path segment per element
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ProviderError::Decode("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Request carrying only the project key
    pub(crate) fn anonymous(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
    }

    /// Request on behalf of the signed-in user
    pub(crate) fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ProviderError> {
        let token = self
            .session
            .read()
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or(ProviderError::NotSignedIn)?;
        Ok(request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token))
    }

    /// User token when signed in, project key otherwise
    fn as_current_user(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.session.read().as_ref().map(|s| s.access_token.clone());
        match token {
            Some(token) => request
                .header("apikey", &self.config.anon_key)
                .bearer_auth(token),
            None => self.anonymous(request),
        }
    }

    fn replace_session(&self, session: Option<Session>) {
        *self.session.write() = session.clone();

        let Some(file) = &self.store else {
            return;
        };
        let result = match &session {
            Some(session) => file.save(session),
            None => file.clear(),
        };
        if let Err(e) = result {
            tracing::warn!(path = %file.path().display(), error = %e, "could not persist session");
        }
    }

    fn profile_rows(&self) -> Result<Url, ProviderError> {
        self.endpoint(&["rest", "v1", self.config.profile_table.as_str()])
    }
}

/// Read a success body as JSON, or map the failure
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let response = check_status(response).await?;
    response.json::<T>().await.map_err(|e| wire::transport(&e))
}

/// Pass success responses through; turn the rest into provider errors
pub(crate) async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(wire::error_from_response(status.as_u16(), &body))
}

#[async_trait]
impl AuthProvider for RestBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let url = self.endpoint(&["auth", "v1", "token"])?;
        let response = self
            .anonymous(self.http.post(url))
            .query(&[("grant_type", "password")])
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(|e| wire::transport(&e))?;
        let grant: TokenResponse = read_json(response).await?;
        let session = grant.into_session(Utc::now());

        tracing::debug!(account = %session.account_id(), "password grant accepted");
        self.replace_session(Some(session.clone()));
        self.bus.emit(AuthStateChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, ProviderError> {
        let url = self.endpoint(&["auth", "v1", "signup"])?;
        let response = self
            .anonymous(self.http.post(url))
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(|e| wire::transport(&e))?;
        let body: serde_json::Value = read_json(response).await?;
        let identity = wire::parse_sign_up(body, email, Utc::now())?;

        if let Some(session) = &identity.session {
            self.replace_session(Some(session.clone()));
            self.bus.emit(AuthStateChange::signed_in(session.clone()));
        } else {
            tracing::info!(account = %identity.id, "sign-up awaiting confirmation");
        }
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let request = self.authorized(self.http.post(self.endpoint(&["auth", "v1", "logout"])?));
        let outcome = match request {
            Ok(request) => match request.send().await {
                Ok(response) => check_status(response).await.map(drop),
                Err(e) => Err(wire::transport(&e)),
            },
            // Nothing to revoke server-side
            Err(ProviderError::NotSignedIn) => Ok(()),
            Err(e) => Err(e),
        };

        // The local session ends regardless of what the server said
        self.replace_session(None);
        self.bus.emit(AuthStateChange::signed_out());

        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "server-side sign-out failed; local session cleared");
        }
        outcome
    }

    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        if !session.is_expired_at(Utc::now()) {
            return Ok(Some(session));
        }
        if session.refresh_token.is_none() {
            tracing::info!(account = %session.account_id(), "stored session expired");
            self.replace_session(None);
            return Ok(None);
        }

        match self.refresh_session().await {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(error = %e, "could not refresh stored session");
                self.replace_session(None);
                self.bus.emit(AuthStateChange::signed_out());
                Err(e)
            }
        }
    }

    fn on_auth_state_change(&self) -> Subscription {
        self.bus.subscribe()
    }
}

#[async_trait]
impl ProfileStore for RestBackend {
    async fn fetch_profile(&self, id: AccountId) -> Result<Profile, ProviderError> {
        let response = self
            .as_current_user(self.http.get(self.profile_rows()?))
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())])
            .header(header::ACCEPT, SINGLE_OBJECT)
            .send()
            .await
            .map_err(|e| wire::transport(&e))?;
        read_json(response).await
    }

    async fn insert_profile(&self, profile: &Profile) -> Result<(), ProviderError> {
        let response = self
            .as_current_user(self.http.post(self.profile_rows()?))
            .header("Prefer", "return=minimal")
            .json(&[profile])
            .send()
            .await
            .map_err(|e| wire::transport(&e))?;
        check_status(response).await.map(drop)
    }

    async fn update_profile(
        &self,
        id: AccountId,
        update: &ProfileUpdate,
    ) -> Result<Profile, ProviderError> {
        let response = self
            .authorized(self.http.patch(self.profile_rows()?))?
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())])
            .header("Prefer", "return=representation")
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(update)
            .send()
            .await
            .map_err(|e| wire::transport(&e))?;
        read_json(response).await
    }
}
