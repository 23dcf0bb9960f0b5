//! Versioned page content for the wiki engine.
//!
//! The [`ContentManager`] owns the storage session manager, the path
//! resolver cache, and the reference index, and turns them into page
//! operations: add, save with automatic checkin, read by version, delete
//! with demotion of still-linked pages, delete a single version, and rename
//! with link rewriting in every referrer.
//!
//! # Key Types
//!
//! - [`ContentManager`]: page operations over a [`wiki_store::ContentBackend`]
//! - [`WikiPage`]: one version of a page as handed to callers
//! - [`ReferenceIndex`]: who links to whom, with [`LinkIndex`] as the
//!   in-memory implementation
//! - [`ContentError`]: the error type for every operation
//!
//! # Link Markup
//!
//! [`links`] understands `[Page]`, `[text|Page]`, `[text|Page|attrs]`,
//! `Space:Page` targets, `#anchor` suffixes, the `~` and `[[` escapes, and
//! optionally bare CamelCase words.

pub mod error;
pub mod links;
pub mod manager;
pub mod page;
pub mod references;

pub use error::{ContentError, Result};
pub use links::{is_camel_case, referenced_pages, rewrite_links, scan, Link, Token};
pub use manager::{ContentManager, ContentOptions};
pub use page::WikiPage;
pub use references::{LinkIndex, ReferenceIndex};
