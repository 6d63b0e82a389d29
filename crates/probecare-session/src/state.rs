//! Observable synchronizer state

use crate::error::SessionError;
use crate::state_machine::Phase;
use crate::types::{Profile, Role, Session};

/// Snapshot of who the current actor is
///
/// Invariants kept by the synchronizer:
/// - `profile.id` equals the session's account id whenever both are present
/// - `loading` is true only while startup restore or a credential operation
///   is in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchronizerState {
    /// Cached provider session
    pub session: Option<Session>,
    /// Cached business profile for the session's account
    pub profile: Option<Profile>,
    /// Startup restore or a credential operation is in flight
    pub loading: bool,
    /// Most recent failure, cleared when the next operation starts
    pub error: Option<SessionError>,
    pub(crate) restoring: bool,
    pub(crate) pending: usize,
}

impl SynchronizerState {
    /// State at construction: restore pending, nothing known
    pub(crate) fn initializing() -> Self {
        Self {
            session: None,
            profile: None,
            loading: true,
            error: None,
            restoring: true,
            pending: 0,
        }
    }

    pub(crate) fn refresh_loading(&mut self) {
        self.loading = self.restoring || self.pending > 0;
    }

    /// Lifecycle phase implied by this snapshot
    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.pending > 0 {
            Phase::Authenticating
        } else if self.session.is_some() {
            Phase::Authenticated
        } else if self.restoring {
            Phase::Initializing
        } else {
            Phase::Unauthenticated
        }
    }

    /// Session present
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// True only when a profile is cached and carries `role`
    #[inline]
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.profile.as_ref().is_some_and(|p| p.role == role)
    }

    #[inline]
    #[must_use]
    pub fn is_sales(&self) -> bool {
        self.has_role(Role::Sales)
    }

    #[inline]
    #[must_use]
    pub fn is_engineer(&self) -> bool {
        self.has_role(Role::Engineer)
    }

    /// Profile name, else session email, else `fallback`
    #[must_use]
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.profile
            .as_ref()
            .map(|p| p.name.as_str())
            .filter(|name| !name.is_empty())
            .or_else(|| {
                self.session
                    .as_ref()
                    .map(Session::email)
                    .filter(|email| !email.is_empty())
            })
            .unwrap_or(fallback)
    }

    /// Error text for display
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}
