use thiserror::Error;
use tracing::error;

use wiki_resolver::ResolveError;
use wiki_store::StoreError;
use wiki_types::{PageVersion, TypeError};

/// Errors from page content operations.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The page, or the requested version of it, does not exist.
    #[error("page not found: {path} (version {version})")]
    NotFound { path: String, version: PageVersion },

    /// A page already occupies the target path.
    #[error("page already exists: {0}")]
    AlreadyExists(String),

    /// Malformed path, empty rename target, self-rename, and similar.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Content types must look like `type/subtype`.
    #[error("invalid content type {0:?}")]
    InvalidContentType(String),

    /// A checkin tried to overwrite an existing history entry.
    #[error("version {version} of {path} is already checked in")]
    VersionConflict { path: String, version: u32 },

    /// An invariant that should always hold was violated.
    #[error("internal consistency violation: {0}")]
    Internal(String),

    /// The storage backend failed.
    #[error("provider error: {0}")]
    Provider(#[source] StoreError),
}

impl ContentError {
    pub(crate) fn not_found(path: impl ToString, version: PageVersion) -> Self {
        Self::NotFound {
            path: path.to_string(),
            version,
        }
    }

    /// Build an [`Internal`](Self::Internal) error, logging it first.
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(%message, "internal consistency violation");
        Self::Internal(message)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::InvalidContentType(_))
    }

    /// Returns `true` for faults the caller cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Internal(_) | Self::VersionConflict { .. } | Self::Provider(_)
        )
    }
}

impl From<StoreError> for ContentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { location, version } => {
                error!(%location, version, "checkin would overwrite history");
                Self::VersionConflict {
                    path: location,
                    version,
                }
            }
            other => Self::Provider(other),
        }
    }
}

impl From<TypeError> for ContentError {
    fn from(err: TypeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<ResolveError> for ContentError {
    fn from(err: ResolveError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Result alias for content operations.
pub type Result<T> = std::result::Result<T, ContentError>;
