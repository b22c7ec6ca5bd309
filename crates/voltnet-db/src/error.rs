use thiserror::Error;

/// Store-level error taxonomy. Handlers translate these into HTTP statuses;
/// the sync client maps any of them into a rollback of pending optimistic
/// state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed input: empty message body, self-conversation, bad kind tag.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Caller is not a participant/owner of the resource.
    #[error("not authorized")]
    NotAuthorized,

    /// Resource id does not resolve.
    #[error("not found")]
    NotFound,

    /// Reserved for future multi-writer scenarios. Idempotent paths
    /// (duplicate create, repeated mark-read) succeed instead of raising it.
    #[error("conflict")]
    Conflict,

    /// Storage or lock unavailability.
    #[error("transient store failure: {0}")]
    Transient(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Transient(e.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
