//! Page path resolution for the wiki content engine.
//!
//! # Modules
//!
//! - [`location`]: [`PathResolver`] maps page paths to storage locations and
//!   caches the mapping
//! - [`names`]: [`clean_link`] name cleaning used for rename targets and link
//!   comparison
//! - [`chain`]: [`ResolverChain`] of [`NameResolver`]s tried when a requested
//!   page does not exist (special names, English plurals)
//! - [`error`]: Error types for resolution

pub mod chain;
pub mod error;
pub mod location;
pub mod names;

pub use chain::{Candidate, EnglishPluralResolver, NameResolver, ResolverChain, SpecialNameResolver};
pub use error::{ResolveError, Result};
pub use location::{location_of, PathResolver};
pub use names::{clean_link, clean_path, names_match};
