//! Foundation types for the wiki content engine.
//!
//! Every other wiki crate depends on `wiki-types` for the vocabulary it uses
//! to talk about pages.
//!
//! # Key Types
//!
//! - [`WikiPath`]: Space-qualified page or attachment identifier
//! - [`PageVersion`]: Latest-or-exact version selector
//! - [`Acl`]: Access-control list stored alongside a page
//! - [`Attributes`]: Free-form attribute map
//! - [`Timestamp`]: UTC wall-clock time

pub mod acl;
pub mod attributes;
pub mod error;
pub mod path;
pub mod version;

pub use acl::{Acl, AclEntry};
pub use attributes::{keys, Attributes, Timestamp, WIKI_MARKUP};
pub use error::TypeError;
pub use path::{WikiPath, DEFAULT_SPACE};
pub use version::PageVersion;
