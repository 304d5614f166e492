use thiserror::Error;

/// Main error type for strata operations
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Read past end of file: position {position}, length {length}")]
    OutOfRange { position: u64, length: u64 },

    #[error("Lock held: {0}")]
    LockHeld(String),

    #[error("Corrupt state: {0}")]
    CorruptState(String),

    #[error("Already closed: {0}")]
    Closed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for strata operations
pub type Result<T> = std::result::Result<T, StrataError>;

impl StrataError {
    /// Check if this error indicates contention that could be retried
    pub fn is_retriable(&self) -> bool {
        matches!(self, StrataError::LockHeld(_))
    }

    /// Errors that indicate a caller bug or corruption rather than a
    /// condition the caller can handle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StrataError::OutOfRange { .. } | StrataError::CorruptState(_)
        )
    }

    pub(crate) fn corrupt(what: impl Into<String>) -> Self {
        StrataError::CorruptState(what.into())
    }
}
