use thiserror::Error;

/// Failure taxonomy shared by all bridge traits.
///
/// The engine's recovery rules key off these variants: `Unauthorized` is
/// never surfaced as an error state (the auth layer owns recovery),
/// `Cache` failures are logged and discarded, `Network` and `Server`
/// failures follow the stale-preservation rules of the state machine.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),
}

impl BridgeError {
    /// Whether this failure belongs to the authentication layer.
    ///
    /// Auth failures must never transition the sync state to `Error`;
    /// the auth layer is responsible for redirecting to login.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, BridgeError::Unauthorized(_))
    }

    /// Whether this failure came from the local cache.
    ///
    /// The cache is an optimization, not a source of truth; cache failures
    /// are logged only.
    pub fn is_cache_failure(&self) -> bool {
        matches!(self, BridgeError::Cache(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_are_classified() {
        assert!(BridgeError::Unauthorized("expired session".into()).is_auth_failure());
        assert!(!BridgeError::Network("timeout".into()).is_auth_failure());
        assert!(BridgeError::Cache("corrupt entry".into()).is_cache_failure());
    }
}
