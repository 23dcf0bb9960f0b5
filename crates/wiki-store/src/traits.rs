use wiki_types::WikiPath;

use crate::error::StoreResult;
use crate::key::{NodeKey, PathRoot};
use crate::record::{NodeRecord, VersionedProperties};

/// One structural change applied by [`ContentBackend::apply`].
#[derive(Clone, Debug)]
pub enum Mutation {
    /// Insert or replace the node at `key`.
    PutNode { key: NodeKey, record: NodeRecord },

    /// Remove the node at `key`, its version history, and every node below it.
    RemoveNode { key: NodeKey },

    /// Add a version-history entry. Create-only: fails with
    /// `VersionConflict` if the version number is already present.
    PutVersion {
        key: NodeKey,
        properties: VersionedProperties,
    },

    /// Drop one version-history entry. Missing entries are ignored.
    RemoveVersion { key: NodeKey, version: u32 },

    /// Relocate the node at `from`, its descendants, and their histories.
    ///
    /// Fails with `NotFound` if `from` is absent and `AlreadyExists` if
    /// `to` is occupied. Stored paths are rebased from `from_path` to
    /// `to_path`.
    Move {
        from: NodeKey,
        to: NodeKey,
        from_path: WikiPath,
        to_path: WikiPath,
    },
}

impl Mutation {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PutNode { .. } => "put-node",
            Self::RemoveNode { .. } => "remove-node",
            Self::PutVersion { .. } => "put-version",
            Self::RemoveVersion { .. } => "remove-version",
            Self::Move { .. } => "move",
        }
    }
}

/// Storage capability behind the content layer.
///
/// All implementations must satisfy these invariants:
/// - `apply` is all-or-nothing with respect to readers of the same backend:
///   either every mutation in the batch is visible or none is.
/// - Version-history entries are never overwritten.
/// - "Not found" is reported as `Ok(None)` or an empty list, never as an error.
/// - All I/O errors are propagated, never silently ignored.
pub trait ContentBackend: Send + Sync {
    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// Read the current record at `key`.
    fn read(&self, key: &NodeKey) -> StoreResult<Option<NodeRecord>>;

    /// Read one version-history entry.
    fn read_version(&self, key: &NodeKey, version: u32) -> StoreResult<Option<VersionedProperties>>;

    /// All version-history entries of `key`, oldest first.
    fn list_versions(&self, key: &NodeKey) -> StoreResult<Vec<VersionedProperties>>;

    /// Every record in `root` whose location starts with `prefix`.
    fn list(&self, root: PathRoot, prefix: &str) -> StoreResult<Vec<NodeRecord>>;

    /// Apply a batch of mutations atomically.
    fn apply(&self, mutations: &[Mutation]) -> StoreResult<()>;

    /// Check whether a record exists at `key`.
    fn exists(&self, key: &NodeKey) -> StoreResult<bool> {
        Ok(self.read(key)?.is_some())
    }
}
