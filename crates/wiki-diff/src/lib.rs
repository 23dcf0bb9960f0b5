//! Line diffs of page text.
//!
//! The approval workflow attaches a human-readable diff of the current and
//! proposed text so an approver can review a pending save. Storage
//! correctness never depends on it.
//!
//! # Key Types
//!
//! - [`DiffProvider`]: the pluggable diff interface used by the engine
//! - [`LineDiffProvider`]: default provider backed by [`diff_text`]
//! - [`PageDiff`] / [`Hunk`] / [`Line`]: structured line diff

pub mod text_diff;

pub use text_diff::{diff_text, Hunk, Line, PageDiff};

/// Produces a human-readable diff between two texts.
pub trait DiffProvider: Send + Sync {
    fn diff(&self, old: &str, new: &str) -> String;
}

/// Unified-style line diff.
#[derive(Clone, Copy, Debug, Default)]
pub struct LineDiffProvider;

impl DiffProvider for LineDiffProvider {
    fn diff(&self, old: &str, new: &str) -> String {
        diff_text(old, new).to_unified()
    }
}
