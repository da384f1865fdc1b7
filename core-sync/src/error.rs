use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Engine disposed")]
    Disposed,

    #[error("Shelf {key} not found")]
    ShelfNotFound { key: String },

    #[error("No list selected")]
    NoListSelected,

    #[error("Background task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Whether this failure belongs to the authentication layer and must
    /// therefore never surface as an `Error` state.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SyncError::Bridge(e) if e.is_auth_failure())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
