use thiserror::Error;

/// Client-side failure surface. Any of these rolls back pending optimistic
/// state for the operation that produced it; retry is manual, by re-invoking
/// the action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Network-level failure: the request never produced a server verdict.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
}

impl SyncError {
    pub fn transport(e: impl std::fmt::Display) -> Self {
        SyncError::Transport(e.to_string())
    }
}
