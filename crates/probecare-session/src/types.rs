//! Core types for the session layer
//!
//! Defines the records the synchronizer mirrors:
//! - Account identifiers and provider sessions
//! - Business profiles and their roles
//! - Auth lifecycle events delivered by the provider

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account identifier issued by the auth provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

impl AccountId {
    /// Generate a fresh random identifier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The identity half of a session: who the provider says is signed in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Account identifier
    pub id: AccountId,
    /// Account email
    #[serde(default)]
    pub email: String,
}

/// Provider-issued proof of authenticated identity
///
/// Held read-only by the synchronizer. Tokens are redacted from `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token for authenticated requests
    pub access_token: String,
    /// Long-lived token used to obtain a new access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// The signed-in account
    pub user: SessionUser,
}

impl Session {
    /// Account this session belongs to
    #[inline]
    #[must_use]
    pub fn account_id(&self) -> AccountId {
        self.user.id
    }

    /// Email of the signed-in account
    #[inline]
    #[must_use]
    pub fn email(&self) -> &str {
        &self.user.email
    }

    /// True when the access token is past its expiry
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Identity created by sign-up
///
/// Providers that confirm accounts immediately also hand back a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// New account identifier
    pub id: AccountId,
    /// Registered email
    pub email: String,
    /// Session issued alongside the identity, if any
    pub session: Option<Session>,
}

/// Business role of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Sales staff
    #[serde(rename = "VENTAS", alias = "SALES")]
    Sales,
    /// Field engineer
    #[serde(rename = "INGENIERO", alias = "ENGINEER")]
    Engineer,
}

impl Role {
    /// All roles, in display order
    pub const ALL: [Role; 2] = [Role::Sales, Role::Engineer];

    /// Value stored in the profile table
    #[inline]
    #[must_use]
    pub fn as_wire(&self) -> &'static str {
        match self {
            Role::Sales => "VENTAS",
            Role::Engineer => "INGENIERO",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sales => write!(f, "SALES"),
            Role::Engineer => write!(f, "ENGINEER"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SALES" | "VENTAS" => Ok(Role::Sales),
            "ENGINEER" | "INGENIERO" => Ok(Role::Engineer),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Business record describing a user, keyed by account id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Same value as the owning session's account id
    pub id: AccountId,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Business role
    #[serde(rename = "type")]
    pub role: Role,
}

/// Outcome of a successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Identity created by sign-up
    pub account: AccountId,
    /// Sign-up returned a session, so a SIGNED_IN for `account` follows
    pub signed_in: bool,
}

/// Registration form contents
#[derive(Clone, PartialEq, Eq)]
pub struct ProfileDraft {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl ProfileDraft {
    /// Create a draft
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            role,
        }
    }

    /// Profile row to insert once the identity exists
    #[must_use]
    pub fn to_profile(&self, id: AccountId) -> Profile {
        Profile {
            id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

impl fmt::Debug for ProfileDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileDraft")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// Partial profile update; absent fields are left untouched server-side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl ProfileUpdate {
    /// Empty update
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// With email
    #[inline]
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// With role
    #[inline]
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// True when no field would change
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.role.is_none()
    }
}

/// Auth lifecycle notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthEvent::SignedIn => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed => "TOKEN_REFRESHED",
        };
        f.write_str(name)
    }
}

/// One delivery on the auth event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStateChange {
    /// What happened
    pub event: AuthEvent,
    /// Session current as of the event
    pub session: Option<Session>,
}

impl AuthStateChange {
    /// Signed in with the given session
    #[must_use]
    pub fn signed_in(session: Session) -> Self {
        Self {
            event: AuthEvent::SignedIn,
            session: Some(session),
        }
    }

    /// Signed out
    #[must_use]
    pub fn signed_out() -> Self {
        Self {
            event: AuthEvent::SignedOut,
            session: None,
        }
    }

    /// Token refreshed, carrying the new session
    #[must_use]
    pub fn token_refreshed(session: Session) -> Self {
        Self {
            event: AuthEvent::TokenRefreshed,
            session: Some(session),
        }
    }
}
