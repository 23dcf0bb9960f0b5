//! Page node storage for the wiki content engine.
//!
//! Pages, attachments, and their version histories are stored as
//! [`NodeRecord`]s addressed by a [`NodeKey`]: the tree they live in (saved
//! pages or the staging area for never-saved names) plus a lower-cased
//! [`Location`].
//!
//! # Storage Backends
//!
//! All backends implement the [`ContentBackend`] trait:
//!
//! - [`InMemoryBackend`]: map-based backend for tests and embedding
//! - [`FileBackend`]: JSON files under a directory, mirrored in memory
//!
//! # Sessions
//!
//! Writes go through a [`Session`], which stages [`Mutation`]s and applies
//! them as one atomic batch on commit. The [`SessionManager`] hands out one
//! session per worker thread plus independent sessions on request.
//!
//! # Design Rules
//!
//! 1. Version-history entries are create-only; overwriting one is an error.
//! 2. A batch is all-or-nothing for readers of the same backend.
//! 3. Only [`VersionedProperties`] are copied into history.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod key;
pub mod memory;
pub mod record;
pub mod session;
mod state;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use key::{Location, NodeKey, PathRoot};
pub use memory::InMemoryBackend;
pub use record::{NodeId, NodeRecord, TransientProperties, VersionedProperties};
pub use session::{Session, SessionManager};
pub use traits::{ContentBackend, Mutation};
