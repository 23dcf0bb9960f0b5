//! The wiki content engine.
//!
//! Wires the content manager, lock manager, name resolvers, page filters,
//! and the approval workflow into one [`WikiEngine`], configured from an
//! [`EngineConfig`]. This is the entry point for applications embedding
//! the wiki core.
//!
//! # Key Types
//!
//! - [`WikiEngine`]: page operations, locks, and the approval inbox
//! - [`EngineConfig`] / [`BackendConfig`]: TOML configuration
//! - [`PageFilter`]: hook that can rewrite or veto a save
//! - [`PreSaveTask`] / [`SaveTask`]: the two halves of every page save
//!
//! # Saving
//!
//! ```rust
//! use wiki_engine::{Actor, EngineConfig, SaveOutcome, WikiEngine};
//! use wiki_types::PageVersion;
//!
//! let engine = WikiEngine::new(EngineConfig::default()).unwrap();
//! let alice = Actor::authenticated("alice");
//! assert_eq!(engine.save_text("Foo", "v1", &alice).unwrap(), SaveOutcome::Saved(1));
//! assert_eq!(engine.save_text("Foo", "v1", &alice).unwrap(), SaveOutcome::Unchanged);
//! assert_eq!(engine.get_text("Foo", PageVersion::Latest).unwrap(), "v1");
//! ```

pub mod acl;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod tasks;

pub use acl::parse_acl;
pub use config::{BackendConfig, EngineConfig};
pub use engine::{Actor, SaveOutcome, WikiEngine};
pub use error::{EngineError, EngineResult};
pub use filter::{FilterError, FilterManager, PageFilter};
pub use tasks::{PreSaveTask, SaveTask, Services, SAVE_WORKFLOW};

pub use wiki_content::WikiPage;
pub use wiki_lock::PageLock;
pub use wiki_types::{PageVersion, WikiPath};
pub use wiki_workflow::{WorkflowId, WorkflowState, WorkflowSummary};
