//! Error types for name resolution.

use thiserror::Error;
use wiki_types::TypeError;

/// Errors that can occur while cleaning or resolving page names.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The name contains nothing that survives cleaning.
    #[error("invalid page name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The cleaned name does not form a valid path.
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Convenience type alias for resolver operations.
pub type Result<T> = std::result::Result<T, ResolveError>;
