use crate::error::SessionError;
use serde::{Deserialize, Serialize};

/// Coarse lifecycle phase of the synchronizer, derived from its state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Startup restore has not finished and no session is known yet
    Initializing,
    /// No session
    Unauthenticated,
    /// A credential operation is in flight
    Authenticating,
    /// Session present; profile may still be resolving
    Authenticated,
}

/// Validates a phase change.
///
/// Illegal changes are reported as an error; with the `strict-debug` feature
/// they panic instead so tests catch them at the source.
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), SessionError> {
    if from == to || allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal phase transition attempted: {from:?} -> {to:?}");

        Err(SessionError::IllegalTransition { from, to })
    }
}

pub fn allowed_transitions(from: Phase) -> Vec<Phase> {
    use Phase::*;
    match from {
        Initializing => vec![Unauthenticated, Authenticating, Authenticated],
        Unauthenticated => vec![Authenticating, Authenticated],
        // A credential call made during startup restore falls back to Initializing
        Authenticating => vec![Authenticated, Unauthenticated, Initializing],
        Authenticated => vec![Authenticating, Unauthenticated],
    }
}

fn allowed(from: Phase, to: Phase) -> bool {
    allowed_transitions(from).into_iter().any(|p| p == to)
}
