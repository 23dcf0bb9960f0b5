use std::collections::{BTreeMap, BTreeSet};

use crate::error::{StoreError, StoreResult};
use crate::key::{NodeKey, PathRoot};
use crate::record::{NodeRecord, VersionedProperties};
use crate::traits::Mutation;

/// Keys touched by a batch, so persistent backends know what to rewrite.
#[derive(Debug, Default)]
pub(crate) struct Touched {
    pub nodes: BTreeSet<NodeKey>,
    pub versions: BTreeSet<(NodeKey, u32)>,
}

/// Node table plus version histories, shared by every backend.
#[derive(Clone, Debug, Default)]
pub(crate) struct State {
    pub nodes: BTreeMap<NodeKey, NodeRecord>,
    pub history: BTreeMap<NodeKey, BTreeMap<u32, VersionedProperties>>,
}

impl State {
    pub fn read(&self, key: &NodeKey) -> Option<NodeRecord> {
        self.nodes.get(key).cloned()
    }

    pub fn read_version(&self, key: &NodeKey, version: u32) -> Option<VersionedProperties> {
        self.history.get(key).and_then(|h| h.get(&version)).cloned()
    }

    pub fn list_versions(&self, key: &NodeKey) -> Vec<VersionedProperties> {
        self.history
            .get(key)
            .map(|h| h.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn list(&self, root: PathRoot, prefix: &str) -> Vec<NodeRecord> {
        let prefix = prefix.to_lowercase();
        self.nodes
            .iter()
            .filter(|(k, _)| k.root == root && k.location.as_str().starts_with(&prefix))
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Apply a batch in place, returning the touched keys and an undo log.
    /// If any mutation fails the earlier ones are undone and `self` is left
    /// as it was.
    pub fn apply_batch(&mut self, mutations: &[Mutation]) -> StoreResult<(Touched, Undo)> {
        let mut touched = Touched::default();
        let mut undo = Undo::default();
        for m in mutations {
            if let Err(e) = self.apply(m, &mut touched, &mut undo) {
                self.revert(undo);
                return Err(e);
            }
        }
        Ok((touched, undo))
    }

    /// Put back everything recorded in `undo`.
    pub fn revert(&mut self, undo: Undo) {
        for (key, prior) in undo.nodes {
            match prior {
                Some(record) => self.nodes.insert(key, record),
                None => self.nodes.remove(&key),
            };
        }
        for (key, prior) in undo.history {
            match prior {
                Some(history) => self.history.insert(key, history),
                None => self.history.remove(&key),
            };
        }
    }

    fn apply(&mut self, mutation: &Mutation, touched: &mut Touched, undo: &mut Undo) -> StoreResult<()> {
        match mutation {
            Mutation::PutNode { key, record } => {
                undo.node(&self.nodes, key);
                self.nodes.insert(key.clone(), record.clone());
                touched.nodes.insert(key.clone());
            }
            Mutation::RemoveNode { key } => {
                let doomed: Vec<NodeKey> =
                    self.nodes.keys().filter(|k| k.is_within(key)).cloned().collect();
                for k in doomed {
                    undo.node(&self.nodes, &k);
                    self.nodes.remove(&k);
                    touched.nodes.insert(k);
                }
                let doomed: Vec<NodeKey> =
                    self.history.keys().filter(|k| k.is_within(key)).cloned().collect();
                for k in doomed {
                    undo.history(&self.history, &k);
                    if let Some(h) = self.history.remove(&k) {
                        for v in h.into_keys() {
                            touched.versions.insert((k.clone(), v));
                        }
                    }
                }
            }
            Mutation::PutVersion { key, properties } => {
                if self
                    .history
                    .get(key)
                    .is_some_and(|h| h.contains_key(&properties.version))
                {
                    return Err(StoreError::VersionConflict {
                        location: key.to_string(),
                        version: properties.version,
                    });
                }
                undo.history(&self.history, key);
                self.history
                    .entry(key.clone())
                    .or_default()
                    .insert(properties.version, properties.clone());
                touched.versions.insert((key.clone(), properties.version));
            }
            Mutation::RemoveVersion { key, version } => {
                if self.history.get(key).is_some_and(|h| h.contains_key(version)) {
                    undo.history(&self.history, key);
                }
                if let Some(h) = self.history.get_mut(key) {
                    if h.remove(version).is_some() {
                        touched.versions.insert((key.clone(), *version));
                    }
                    if h.is_empty() {
                        self.history.remove(key);
                    }
                }
            }
            Mutation::Move {
                from,
                to,
                from_path,
                to_path,
            } => {
                if !self.nodes.contains_key(from) {
                    return Err(StoreError::NotFound(from.to_string()));
                }
                if self.nodes.contains_key(to) {
                    return Err(StoreError::AlreadyExists(to.to_string()));
                }

                let moving: Vec<NodeKey> =
                    self.nodes.keys().filter(|k| k.is_within(from)).cloned().collect();
                for old in moving {
                    let Some(new) = old.rebase(from, to) else { continue };
                    undo.node(&self.nodes, &old);
                    undo.node(&self.nodes, &new);
                    if let Some(mut record) = self.nodes.remove(&old) {
                        if let Some(path) = record.path.rebase(from_path, to_path) {
                            record.path = path;
                        }
                        self.nodes.insert(new.clone(), record);
                    }
                    touched.nodes.insert(old);
                    touched.nodes.insert(new);
                }

                let moving: Vec<NodeKey> =
                    self.history.keys().filter(|k| k.is_within(from)).cloned().collect();
                for old in moving {
                    let Some(new) = old.rebase(from, to) else { continue };
                    undo.history(&self.history, &old);
                    undo.history(&self.history, &new);
                    if let Some(h) = self.history.remove(&old) {
                        for v in h.keys() {
                            touched.versions.insert((old.clone(), *v));
                            touched.versions.insert((new.clone(), *v));
                        }
                        self.history.insert(new, h);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Values a batch overwrote, keyed by the first time each key was touched.
#[derive(Debug, Default)]
pub(crate) struct Undo {
    nodes: BTreeMap<NodeKey, Option<NodeRecord>>,
    history: BTreeMap<NodeKey, Option<BTreeMap<u32, VersionedProperties>>>,
}

impl Undo {
    fn node(&mut self, nodes: &BTreeMap<NodeKey, NodeRecord>, key: &NodeKey) {
        self.nodes
            .entry(key.clone())
            .or_insert_with(|| nodes.get(key).cloned());
    }

    fn history(&mut self, history: &BTreeMap<NodeKey, BTreeMap<u32, VersionedProperties>>, key: &NodeKey) {
        self.history
            .entry(key.clone())
            .or_insert_with(|| history.get(key).cloned());
    }
}
