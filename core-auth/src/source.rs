//! Auth State Notifications
//!
//! An explicitly constructed, injected notifier over [`AuthState`]. The
//! auth layer owns the single writer; any number of observers subscribe.
//! Latest-value semantics: a subscriber that misses intermediate
//! transitions still observes the current state, which is all the engine
//! ever needs.

use tokio::sync::watch;
use tracing::debug;

use crate::types::AuthState;

/// Publisher/observer handle for the authentication state machine.
///
/// # Example
///
/// ```
/// use core_auth::{AuthState, AuthStateSource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let source = AuthStateSource::new();
/// let mut rx = source.subscribe();
///
/// source.set_state(AuthState::Loading);
/// rx.changed().await.unwrap();
/// assert_eq!(*rx.borrow(), AuthState::Loading);
/// # }
/// ```
#[derive(Debug)]
pub struct AuthStateSource {
    sender: watch::Sender<AuthState>,
}

impl AuthStateSource {
    /// Create a source in the [`AuthState::Initial`] state.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(AuthState::Initial);
        Self { sender }
    }

    /// The current state.
    pub fn current(&self) -> AuthState {
        *self.sender.borrow()
    }

    /// Publish a transition. Setting the current state again is a no-op
    /// and does not wake observers.
    pub fn set_state(&self, state: AuthState) {
        let previous = self.current();
        if previous == state {
            return;
        }
        debug!(from = %previous, to = %state, "auth state transition");
        self.sender.send_replace(state);
    }

    /// Subscribe to state changes.
    ///
    /// The receiver observes every change made after this call, collapsed
    /// to latest-value semantics.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.sender.subscribe()
    }
}

impl Default for AuthStateSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_initial() {
        let source = AuthStateSource::new();
        assert_eq!(source.current(), AuthState::Initial);
    }

    #[tokio::test]
    async fn observers_see_transitions() {
        let source = AuthStateSource::new();
        let mut rx = source.subscribe();

        source.set_state(AuthState::Loading);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AuthState::Loading);

        source.set_state(AuthState::Authenticated);
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_authenticated());
    }

    #[tokio::test]
    async fn repeated_state_does_not_notify() {
        let source = AuthStateSource::new();
        let mut rx = source.subscribe();

        source.set_state(AuthState::Unauthenticated);
        rx.changed().await.unwrap();

        source.set_state(AuthState::Unauthenticated);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn late_subscriber_sees_latest_only() {
        let source = AuthStateSource::new();
        source.set_state(AuthState::Loading);
        source.set_state(AuthState::Authenticated);

        let rx = source.subscribe();
        assert_eq!(*rx.borrow(), AuthState::Authenticated);
    }
}
