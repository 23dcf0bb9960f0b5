/// Errors from content backend and session operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The addressed node does not exist.
    #[error("node not found: {0}")]
    NotFound(String),

    /// A node already occupies the target location.
    #[error("node already exists: {0}")]
    AlreadyExists(String),

    /// A version-history entry with this number is already present.
    ///
    /// Checkin is create-only, so this indicates an internal inconsistency.
    #[error("version {version} of {location} already exists in history")]
    VersionConflict { location: String, version: u32 },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be decoded or is inconsistent.
    #[error("corrupt record at {location}: {reason}")]
    Corrupt { location: String, reason: String },

    /// The session was released or closed before use.
    #[error("session {0} is closed")]
    SessionClosed(u64),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
