use serde::{Deserialize, Serialize};
use std::fmt;

/// Authentication state machine published by the auth layer.
///
/// Transitions are driven externally (login, logout, session expiry); the
/// sync engine consumes them and must never act on a torn-down state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    /// Auth layer has not yet determined whether a session exists
    #[default]
    Initial,
    /// A credential exchange or session restore is in progress
    Loading,
    /// A valid session exists
    Authenticated,
    /// No session; the user must sign in
    Unauthenticated,
}

impl AuthState {
    /// Whether remote operations may be attempted in this state.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }

    /// Whether the auth layer is still working towards a decision.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, AuthState::Initial | AuthState::Loading)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Initial => "initial",
            AuthState::Loading => "loading",
            AuthState::Authenticated => "authenticated",
            AuthState::Unauthenticated => "unauthenticated",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_authenticated_allows_remote_calls() {
        assert!(AuthState::Authenticated.is_authenticated());
        for state in [
            AuthState::Initial,
            AuthState::Loading,
            AuthState::Unauthenticated,
        ] {
            assert!(!state.is_authenticated());
        }
    }

    #[test]
    fn progress_states() {
        assert!(AuthState::Initial.is_in_progress());
        assert!(AuthState::Loading.is_in_progress());
        assert!(!AuthState::Authenticated.is_in_progress());
        assert!(!AuthState::Unauthenticated.is_in_progress());
    }
}
