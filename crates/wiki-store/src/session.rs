use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::key::{NodeKey, PathRoot};
use crate::record::{NodeRecord, VersionedProperties};
use crate::traits::{ContentBackend, Mutation};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A unit of work against a content backend.
///
/// Mutations are staged with [`Session::stage`] and become visible to other
/// sessions only on [`Session::commit`], which hands the whole batch to the
/// backend at once. Reads through the session see its own staged node
/// changes layered over the committed state.
pub struct Session {
    id: u64,
    backend: Arc<dyn ContentBackend>,
    pending: Mutex<Vec<Mutation>>,
    closed: AtomicBool,
}

impl Session {
    fn new(backend: Arc<dyn ContentBackend>) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, backend = backend.name(), "opened session");
        Self {
            id,
            backend,
            pending: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns `true` if mutations are staged but not committed.
    pub fn has_pending(&self) -> bool {
        !self.pending.lock().expect("lock poisoned").is_empty()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::SessionClosed(self.id));
        }
        Ok(())
    }

    /// Read a node, including changes staged in this session.
    pub fn read(&self, key: &NodeKey) -> StoreResult<Option<NodeRecord>> {
        self.ensure_open()?;
        let pending = self.pending.lock().expect("lock poisoned");
        self.project(&pending, key)
    }

    /// Read a node as last committed, ignoring anything staged here.
    pub fn read_committed(&self, key: &NodeKey) -> StoreResult<Option<NodeRecord>> {
        self.ensure_open()?;
        self.backend.read(key)
    }

    /// Read a version-history entry, including staged checkins.
    pub fn read_version(&self, key: &NodeKey, version: u32) -> StoreResult<Option<VersionedProperties>> {
        self.ensure_open()?;
        let pending = self.pending.lock().expect("lock poisoned");
        for m in pending.iter().rev() {
            match m {
                Mutation::PutVersion { key: k, properties }
                    if k == key && properties.version == version =>
                {
                    return Ok(Some(properties.clone()));
                }
                Mutation::RemoveVersion { key: k, version: v } if k == key && *v == version => {
                    return Ok(None);
                }
                Mutation::RemoveNode { key: k } if key.is_within(k) => return Ok(None),
                _ => {}
            }
        }
        self.backend.read_version(key, version)
    }

    /// Committed version history of `key`, oldest first.
    pub fn list_versions(&self, key: &NodeKey) -> StoreResult<Vec<VersionedProperties>> {
        self.ensure_open()?;
        self.backend.list_versions(key)
    }

    /// Committed records in `root` under `prefix`.
    pub fn list(&self, root: PathRoot, prefix: &str) -> StoreResult<Vec<NodeRecord>> {
        self.ensure_open()?;
        self.backend.list(root, prefix)
    }

    /// Stage a mutation for the next commit.
    pub fn stage(&self, mutation: Mutation) -> StoreResult<()> {
        self.ensure_open()?;
        self.pending.lock().expect("lock poisoned").push(mutation);
        Ok(())
    }

    /// Apply every staged mutation as one atomic batch.
    ///
    /// On failure nothing is applied and the staged mutations are discarded.
    pub fn commit(&self) -> StoreResult<()> {
        self.ensure_open()?;
        let batch = std::mem::take(&mut *self.pending.lock().expect("lock poisoned"));
        if batch.is_empty() {
            return Ok(());
        }
        debug!(session = self.id, mutations = batch.len(), "committing");
        self.backend.apply(&batch)
    }

    /// Discard staged mutations.
    pub fn rollback(&self) {
        let dropped = std::mem::take(&mut *self.pending.lock().expect("lock poisoned"));
        if !dropped.is_empty() {
            debug!(session = self.id, mutations = dropped.len(), "rolled back");
        }
    }

    /// Close the session, discarding anything uncommitted.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = std::mem::take(&mut *self.pending.lock().expect("lock poisoned"));
        if !dropped.is_empty() {
            warn!(
                session = self.id,
                mutations = dropped.len(),
                "session closed with uncommitted changes"
            );
        }
    }

    /// Resolve `key` against staged mutations, newest first, falling back
    /// to the backend.
    fn project(&self, pending: &[Mutation], key: &NodeKey) -> StoreResult<Option<NodeRecord>> {
        for (idx, m) in pending.iter().enumerate().rev() {
            match m {
                Mutation::PutNode { key: k, record } if k == key => {
                    return Ok(Some(record.clone()));
                }
                Mutation::RemoveNode { key: k } if key.is_within(k) => return Ok(None),
                Mutation::Move {
                    from,
                    to,
                    from_path,
                    to_path,
                } => {
                    if let Some(source) = key.rebase(to, from) {
                        let moved = self.project(&pending[..idx], &source)?;
                        return Ok(moved.map(|mut r| {
                            if let Some(p) = r.path.rebase(from_path, to_path) {
                                r.path = p;
                            }
                            r
                        }));
                    }
                    if key.is_within(from) {
                        return Ok(None);
                    }
                }
                _ => {}
            }
        }
        self.backend.read(key)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Hands out one session per worker thread.
///
/// The first [`current`](Self::current) call on a thread opens a session and
/// later calls on that thread return the same one until
/// [`release`](Self::release). [`independent`](Self::independent) opens a
/// session that is not tied to any thread; it closes when dropped.
pub struct SessionManager {
    backend: Arc<dyn ContentBackend>,
    sessions: Mutex<HashMap<ThreadId, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn ContentBackend>) -> Self {
        Self {
            backend,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn ContentBackend> {
        &self.backend
    }

    /// The calling thread's session, opened on first use.
    pub fn current(&self) -> Arc<Session> {
        let mut sessions = self.sessions.lock().expect("lock poisoned");
        sessions
            .entry(thread::current().id())
            .or_insert_with(|| Arc::new(Session::new(Arc::clone(&self.backend))))
            .clone()
    }

    /// Close and forget the calling thread's session. No-op if none is open.
    pub fn release(&self) {
        let removed = self
            .sessions
            .lock()
            .expect("lock poisoned")
            .remove(&thread::current().id());
        if let Some(session) = removed {
            session.close();
            debug!(session = session.id(), "released session");
        }
    }

    /// A fresh session owned by the caller.
    pub fn independent(&self) -> Session {
        Session::new(Arc::clone(&self.backend))
    }

    /// Number of thread-bound sessions currently open.
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().expect("lock poisoned").len()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("backend", &self.backend.name())
            .field("active_sessions", &self.active_sessions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Location;
    use crate::memory::InMemoryBackend;
    use wiki_types::WikiPath;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(InMemoryBackend::new()))
    }

    fn key(s: &str) -> NodeKey {
        NodeKey::page(Location::new(s))
    }

    fn record(p: &str) -> NodeRecord {
        NodeRecord::new(WikiPath::parse(p).unwrap(), "text/x-wiki")
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn current_is_reused_on_same_thread() {
        let mgr = manager();
        let a = mgr.current();
        let b = mgr.current();
        assert_eq!(a.id(), b.id());
        assert_eq!(mgr.active_sessions(), 1);
    }

    #[test]
    fn threads_get_distinct_sessions() {
        let mgr = Arc::new(manager());
        let here = mgr.current().id();
        let there = {
            let mgr = Arc::clone(&mgr);
            std::thread::spawn(move || mgr.current().id()).join().unwrap()
        };
        assert_ne!(here, there);
        assert_eq!(mgr.active_sessions(), 2);
    }

    #[test]
    fn release_closes_and_next_current_is_fresh() {
        let mgr = manager();
        let first = mgr.current();
        mgr.release();
        assert!(first.is_closed());
        assert!(matches!(first.read(&key("main/x")), Err(StoreError::SessionClosed(_))));

        let second = mgr.current();
        assert_ne!(first.id(), second.id());
        mgr.release();
        mgr.release();
        assert_eq!(mgr.active_sessions(), 0);
    }

    #[test]
    fn independent_session_is_not_thread_bound() {
        let mgr = manager();
        let current = mgr.current();
        let independent = mgr.independent();
        assert_ne!(current.id(), independent.id());
        assert_eq!(mgr.active_sessions(), 1);
    }

    // -----------------------------------------------------------------------
    // Staging
    // -----------------------------------------------------------------------

    #[test]
    fn staged_changes_visible_only_after_commit() {
        let mgr = manager();
        let session = mgr.current();
        let other = mgr.independent();

        session
            .stage(Mutation::PutNode { key: key("main/foo"), record: record("Foo") })
            .unwrap();
        assert!(session.read(&key("main/foo")).unwrap().is_some());
        assert!(session.read_committed(&key("main/foo")).unwrap().is_none());
        assert!(other.read(&key("main/foo")).unwrap().is_none());

        session.commit().unwrap();
        assert!(!session.has_pending());
        assert!(other.read(&key("main/foo")).unwrap().is_some());
    }

    #[test]
    fn rollback_discards_staged() {
        let mgr = manager();
        let session = mgr.current();
        session
            .stage(Mutation::PutNode { key: key("main/foo"), record: record("Foo") })
            .unwrap();
        session.rollback();
        session.commit().unwrap();
        assert!(session.read(&key("main/foo")).unwrap().is_none());
    }

    #[test]
    fn staged_move_is_projected() {
        let mgr = manager();
        let session = mgr.current();
        let staged = NodeKey::not_created(Location::new("main/foo"));
        session
            .stage(Mutation::PutNode { key: staged.clone(), record: record("Foo") })
            .unwrap();
        session.commit().unwrap();

        session
            .stage(Mutation::Move {
                from: staged.clone(),
                to: key("main/foo"),
                from_path: WikiPath::parse("Foo").unwrap(),
                to_path: WikiPath::parse("Foo").unwrap(),
            })
            .unwrap();
        assert!(session.read(&staged).unwrap().is_none());
        assert!(session.read(&key("main/foo")).unwrap().is_some());

        session.commit().unwrap();
        assert!(mgr.backend().read(&key("main/foo")).unwrap().is_some());
    }

    #[test]
    fn failed_commit_discards_batch() {
        let mgr = manager();
        let session = mgr.current();
        session
            .stage(Mutation::Move {
                from: key("main/missing"),
                to: key("main/elsewhere"),
                from_path: WikiPath::parse("Missing").unwrap(),
                to_path: WikiPath::parse("Elsewhere").unwrap(),
            })
            .unwrap();
        assert!(session.commit().is_err());
        assert!(!session.has_pending());
    }
}
