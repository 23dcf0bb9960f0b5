use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::key::{Location, NodeKey, PathRoot};
use crate::record::{NodeRecord, VersionedProperties};
use crate::state::{State, Touched};
use crate::traits::{ContentBackend, Mutation};

/// Extension of directories holding a node's version history.
const HISTORY_DIR_SUFFIX: &str = ".versions";

/// On-disk form of a node.
#[derive(Serialize, Deserialize)]
struct NodeFile {
    key: NodeKey,
    record: NodeRecord,
}

/// On-disk form of one version-history entry.
#[derive(Serialize, Deserialize)]
struct VersionFile {
    key: NodeKey,
    properties: VersionedProperties,
}

/// Directory-backed content backend.
///
/// Layout under the root directory:
///
/// ```text
/// <root>/<tree>/<space>/<blake3(location)>.json
/// <root>/<tree>/<space>/<blake3(location)>.versions/<n>.json
/// ```
///
/// The whole tree is loaded at open and mirrored in memory; reads never
/// touch the disk. Each file is replaced atomically (write to a temporary
/// file, then rename). A batch writes history entries before nodes, so a
/// crash mid-batch can leave an extra history entry but never a bumped
/// node without its predecessor in history.
pub struct FileBackend {
    root: PathBuf,
    state: RwLock<State>,
}

impl FileBackend {
    /// Open (or create) a backend rooted at `root`, creating the tree for
    /// `default_space`.
    pub fn open(root: impl AsRef<Path>, default_space: &str) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(
            root.join(PathRoot::Pages.as_str())
                .join(default_space.to_lowercase()),
        )?;
        fs::create_dir_all(root.join(PathRoot::NotCreated.as_str()))?;

        let state = load(&root)?;
        info!(
            root = %root.display(),
            nodes = state.nodes.len(),
            "opened file backend"
        );
        Ok(Self {
            root,
            state: RwLock::new(state),
        })
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn node_file(&self, key: &NodeKey) -> PathBuf {
        self.space_dir(key).join(format!("{}.json", file_stem(&key.location)))
    }

    fn version_file(&self, key: &NodeKey, version: u32) -> PathBuf {
        self.history_dir(key).join(format!("{version}.json"))
    }

    fn history_dir(&self, key: &NodeKey) -> PathBuf {
        self.space_dir(key)
            .join(format!("{}{HISTORY_DIR_SUFFIX}", file_stem(&key.location)))
    }

    fn space_dir(&self, key: &NodeKey) -> PathBuf {
        self.root.join(key.root.as_str()).join(key.location.space())
    }

    fn persist(&self, next: &State, touched: &Touched) -> StoreResult<()> {
        for (key, version) in &touched.versions {
            let path = self.version_file(key, *version);
            match next.read_version(key, *version) {
                Some(properties) => write_json(
                    &path,
                    &VersionFile {
                        key: key.clone(),
                        properties,
                    },
                )?,
                None => {
                    remove_file(&path)?;
                    let _ = fs::remove_dir(self.history_dir(key));
                }
            }
        }
        for key in &touched.nodes {
            let path = self.node_file(key);
            match next.read(key) {
                Some(record) => write_json(
                    &path,
                    &NodeFile {
                        key: key.clone(),
                        record,
                    },
                )?,
                None => remove_file(&path)?,
            }
        }
        Ok(())
    }
}

impl ContentBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
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
        let (touched, undo) = state.apply_batch(mutations)?;
        if let Err(e) = self.persist(&state, &touched) {
            error!(error = %e, "failed to persist batch; on-disk state may be partial");
            state.revert(undo);
            return Err(e);
        }
        debug!(
            mutations = mutations.len(),
            files = touched.nodes.len() + touched.versions.len(),
            "persisted batch"
        );
        Ok(())
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("root", &self.root)
            .finish()
    }
}

fn file_stem(location: &Location) -> String {
    hex::encode(blake3::hash(location.as_str().as_bytes()).as_bytes())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Io(io::Error::other("file has no parent directory")))?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

fn remove_file(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn load(root: &Path) -> StoreResult<State> {
    let mut state = State::default();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| StoreError::Io(io::Error::other(e.to_string())))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let bytes = fs::read(path)?;
        let in_history = path
            .parent()
            .and_then(|p| p.file_name())
            .is_some_and(|name| name.to_string_lossy().ends_with(HISTORY_DIR_SUFFIX));

        if in_history {
            let file: VersionFile = serde_json::from_slice(&bytes).map_err(|e| corrupt(path, e))?;
            state
                .history
                .entry(file.key)
                .or_default()
                .insert(file.properties.version, file.properties);
        } else {
            let file: NodeFile = serde_json::from_slice(&bytes).map_err(|e| corrupt(path, e))?;
            state.nodes.insert(file.key, file.record);
        }
    }
    Ok(state)
}

fn corrupt(path: &Path, err: serde_json::Error) -> StoreError {
    StoreError::Corrupt {
        location: path.display().to_string(),
        reason: err.to_string(),
    }
}
