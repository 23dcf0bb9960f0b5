use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid page path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid version number: {0}")]
    InvalidVersion(i64),
}

impl TypeError {
    pub(crate) fn path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
