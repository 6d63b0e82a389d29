//! Wire shapes of the hosted auth and REST endpoints

use chrono::{DateTime, TimeZone, Utc};
use probecare_session::{AccountId, Identity, ProviderError, Session, SessionUser};
use serde::{Deserialize, Serialize};

/// `Accept` value that makes the REST endpoint return one object instead of an array
pub(crate) const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// PostgREST code for "single object requested, zero rows found"
const NO_ROWS: &str = "PGRST116";

#[derive(Debug, Serialize)]
pub(crate) struct PasswordGrant<'a> {
    pub(crate) email: &'a str,
    pub(crate) password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshGrant<'a> {
    pub(crate) refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUser {
    pub(crate) id: AccountId,
    #[serde(default)]
    pub(crate) email: Option<String>,
}

/// Successful token grant
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) refresh_token: Option<String>,
    #[serde(default)]
    pub(crate) expires_in: Option<i64>,
    #[serde(default)]
    pub(crate) expires_at: Option<i64>,
    pub(crate) user: WireUser,
}

impl TokenResponse {
    pub(crate) fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                self.expires_in
                    .map(|secs| now + chrono::Duration::seconds(secs))
            });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
            user: SessionUser {
                id: self.user.id,
                email: self.user.email.unwrap_or_default(),
            },
        }
    }
}

/// Sign-up answers with a full token grant when the account is confirmed
/// immediately, and with the bare user otherwise
pub(crate) fn parse_sign_up(
    body: serde_json::Value,
    email: &str,
    now: DateTime<Utc>,
) -> Result<Identity, ProviderError> {
    if body.get("access_token").is_some() {
        let grant: TokenResponse =
            serde_json::from_value(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        let session = grant.into_session(now);
        return Ok(Identity {
            id: session.account_id(),
            email: email.to_string(),
            session: Some(session),
        });
    }

    let user_value = body.get("user").cloned().unwrap_or(body);
    let user: WireUser =
        serde_json::from_value(user_value).map_err(|e| ProviderError::Decode(e.to_string()))?;
    Ok(Identity {
        id: user.id,
        email: user.email.unwrap_or_else(|| email.to_string()),
        session: None,
    })
}

/// Error body shapes of the auth and REST services
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ErrorBody {
    fn text(&self) -> Option<String> {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
    }

    fn is_no_rows(&self) -> bool {
        self.code.as_ref().and_then(|c| c.as_str()) == Some(NO_ROWS)
    }
}

/// Map a non-success response to a provider error
pub(crate) fn error_from_response(status: u16, body: &str) -> ProviderError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .text()
        .unwrap_or_else(|| format!("request failed with status {status}"));

    if status == 404 || (status == 406 && parsed.is_no_rows()) {
        return ProviderError::NotFound(message);
    }
    ProviderError::Rejected {
        status: Some(status),
        message,
    }
}

pub(crate) fn transport(err: &reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::Decode(err.to_string())
    } else {
        ProviderError::Transport(err.to_string())
    }
}
