use std::sync::RwLock;

use tracing::trace;

use crate::error::StoreResult;
use crate::key::{NodeKey, PathRoot};
use crate::record::{NodeRecord, VersionedProperties};
use crate::state::State;
use crate::traits::{ContentBackend, Mutation};

/// In-memory content backend.
///
/// Intended for tests and embedding. Nodes and histories are held behind a
/// `RwLock`; a batch is applied to a copy and swapped in only when every
/// mutation succeeded.
pub struct InMemoryBackend {
    state: RwLock<State>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    /// Number of nodes across both trees.
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").nodes.len()
    }

    /// Returns `true` if no nodes are stored.
    pub fn is_empty(&self) -> bool {
        self.state.read().expect("lock poisoned").nodes.is_empty()
    }

    /// Remove everything.
    pub fn clear(&self) {
        *self.state.write().expect("lock poisoned") = State::default();
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, key: &NodeKey) -> StoreResult<Option<NodeRecord>> {
        Ok(self.state.read().expect("lock poisoned").read(key))
    }

    fn read_version(&self, key: &NodeKey, version: u32) -> StoreResult<Option<VersionedProperties>> {
        Ok(self.state.read().expect("lock poisoned").read_version(key, version))
    }

    fn list_versions(&self, key: &NodeKey) -> StoreResult<Vec<VersionedProperties>> {
        Ok(self.state.read().expect("lock poisoned").list_versions(key))
    }

    fn list(&self, root: PathRoot, prefix: &str) -> StoreResult<Vec<NodeRecord>> {
        Ok(self.state.read().expect("lock poisoned").list(root, prefix))
    }

    fn apply(&self, mutations: &[Mutation]) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let (touched, _) = state.apply_batch(mutations)?;
        trace!(
            mutations = mutations.len(),
            nodes = touched.nodes.len(),
            versions = touched.versions.len(),
            "applied batch"
        );
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("node_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::key::Location;
    use wiki_types::WikiPath;

    fn path(s: &str) -> WikiPath {
        WikiPath::parse(s).unwrap()
    }

    fn key(s: &str) -> NodeKey {
        NodeKey::page(Location::new(s))
    }

    fn record(p: &str, content: &str, version: u32) -> NodeRecord {
        let mut r = NodeRecord::new(path(p), "text/x-wiki");
        r.versioned.content = content.into();
        r.versioned.version = version;
        r
    }

    fn put(k: &str, r: NodeRecord) -> Mutation {
        Mutation::PutNode { key: key(k), record: r }
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_read_node() {
        let backend = InMemoryBackend::new();
        backend.apply(&[put("main/foo", record("Foo", "v1", 1))]).unwrap();

        let read = backend.read(&key("main/foo")).unwrap().unwrap();
        assert_eq!(read.versioned.content, "v1");
        assert!(backend.exists(&key("main/foo")).unwrap());
        assert!(backend.read(&key("main/bar")).unwrap().is_none());
    }

    #[test]
    fn remove_node_drops_subtree_and_history() {
        let backend = InMemoryBackend::new();
        backend
            .apply(&[
                put("main/foo", record("Foo", "v2", 2)),
                put("main/foo/a.txt", record("Foo/a.txt", "att", 1)),
                put("main/foobar", record("FooBar", "x", 1)),
                Mutation::PutVersion {
                    key: key("main/foo"),
                    properties: record("Foo", "v1", 1).versioned,
                },
            ])
            .unwrap();

        backend.apply(&[Mutation::RemoveNode { key: key("main/foo") }]).unwrap();

        assert!(backend.read(&key("main/foo")).unwrap().is_none());
        assert!(backend.read(&key("main/foo/a.txt")).unwrap().is_none());
        assert!(backend.list_versions(&key("main/foo")).unwrap().is_empty());
        assert!(backend.read(&key("main/foobar")).unwrap().is_some());
    }

    #[test]
    fn list_filters_by_root_and_prefix() {
        let backend = InMemoryBackend::new();
        backend
            .apply(&[
                put("main/foo", record("Foo", "", 1)),
                put("docs/install", record("Docs:Install", "", 1)),
                Mutation::PutNode {
                    key: NodeKey::not_created(Location::new("main/ghost")),
                    record: record("Ghost", "", 0),
                },
            ])
            .unwrap();

        assert_eq!(backend.list(PathRoot::Pages, "").unwrap().len(), 2);
        assert_eq!(backend.list(PathRoot::Pages, "docs/").unwrap().len(), 1);
        assert_eq!(backend.list(PathRoot::NotCreated, "").unwrap().len(), 1);
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    #[test]
    fn put_version_is_create_only() {
        let backend = InMemoryBackend::new();
        let v1 = record("Foo", "v1", 1).versioned;
        backend
            .apply(&[Mutation::PutVersion { key: key("main/foo"), properties: v1.clone() }])
            .unwrap();

        let err = backend
            .apply(&[Mutation::PutVersion { key: key("main/foo"), properties: v1 }])
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { version: 1, .. }));
    }

    #[test]
    fn failed_batch_leaves_state_untouched() {
        let backend = InMemoryBackend::new();
        let v1 = record("Foo", "v1", 1).versioned;
        backend
            .apply(&[Mutation::PutVersion { key: key("main/foo"), properties: v1.clone() }])
            .unwrap();

        let result = backend.apply(&[
            put("main/foo", record("Foo", "v2", 2)),
            Mutation::PutVersion { key: key("main/foo"), properties: v1 },
        ]);
        assert!(result.is_err());
        assert!(backend.read(&key("main/foo")).unwrap().is_none());
    }

    #[test]
    fn failed_batch_undoes_removals_and_moves() {
        let backend = InMemoryBackend::new();
        backend
            .apply(&[
                put("main/a", record("A", "a2", 2)),
                put("main/b", record("B", "b1", 1)),
                Mutation::PutVersion { key: key("main/a"), properties: record("A", "a1", 1).versioned },
            ])
            .unwrap();

        let result = backend.apply(&[
            Mutation::RemoveNode { key: key("main/b") },
            Mutation::Move {
                from: key("main/a"),
                to: key("main/c"),
                from_path: path("A"),
                to_path: path("C"),
            },
            Mutation::PutVersion { key: key("main/c"), properties: record("C", "c1", 1).versioned },
        ]);
        assert!(matches!(result, Err(StoreError::VersionConflict { version: 1, .. })));

        assert_eq!(backend.read(&key("main/a")).unwrap().unwrap().path, path("A"));
        assert_eq!(backend.read_version(&key("main/a"), 1).unwrap().unwrap().content, "a1");
        assert!(backend.read(&key("main/b")).unwrap().is_some());
        assert!(backend.read(&key("main/c")).unwrap().is_none());
        assert!(backend.list_versions(&key("main/c")).unwrap().is_empty());
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn versions_listed_oldest_first() {
        let backend = InMemoryBackend::new();
        for (n, text) in [(2, "v2"), (1, "v1"), (3, "v3")] {
            backend
                .apply(&[Mutation::PutVersion {
                    key: key("main/foo"),
                    properties: record("Foo", text, n).versioned,
                }])
                .unwrap();
        }
        let versions: Vec<u32> = backend
            .list_versions(&key("main/foo"))
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3]);

        backend
            .apply(&[Mutation::RemoveVersion { key: key("main/foo"), version: 2 }])
            .unwrap();
        assert!(backend.read_version(&key("main/foo"), 2).unwrap().is_none());
        assert!(backend.read_version(&key("main/foo"), 3).unwrap().is_some());
    }

    // -----------------------------------------------------------------------
    // Move
    // -----------------------------------------------------------------------

    #[test]
    fn move_carries_attachments_and_history() {
        let backend = InMemoryBackend::new();
        backend
            .apply(&[
                put("main/testpage", record("TestPage", "v2", 2)),
                put("main/testpage/foo.txt", record("TestPage/foo.txt", "att", 1)),
                Mutation::PutVersion {
                    key: key("main/testpage"),
                    properties: record("TestPage", "v1", 1).versioned,
                },
            ])
            .unwrap();

        backend
            .apply(&[Mutation::Move {
                from: key("main/testpage"),
                to: key("main/renamedtest"),
                from_path: path("TestPage"),
                to_path: path("RenamedTest"),
            }])
            .unwrap();

        assert!(backend.read(&key("main/testpage")).unwrap().is_none());
        let moved = backend.read(&key("main/renamedtest")).unwrap().unwrap();
        assert_eq!(moved.path, path("RenamedTest"));
        let att = backend.read(&key("main/renamedtest/foo.txt")).unwrap().unwrap();
        assert_eq!(att.path, path("RenamedTest/foo.txt"));
        assert!(backend.read_version(&key("main/renamedtest"), 1).unwrap().is_some());
    }

    #[test]
    fn move_onto_existing_fails() {
        let backend = InMemoryBackend::new();
        backend
            .apply(&[put("main/a", record("A", "", 1)), put("main/b", record("B", "", 1))])
            .unwrap();
        let err = backend
            .apply(&[Mutation::Move {
                from: key("main/a"),
                to: key("main/b"),
                from_path: path("A"),
                to_path: path("B"),
            }])
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert!(backend.read(&key("main/a")).unwrap().is_some());
    }

    #[test]
    fn move_of_missing_node_fails() {
        let backend = InMemoryBackend::new();
        let err = backend
            .apply(&[Mutation::Move {
                from: key("main/a"),
                to: key("main/b"),
                from_path: path("A"),
                to_path: path("B"),
            }])
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
