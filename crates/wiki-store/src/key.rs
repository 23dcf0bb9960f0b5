use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical storage location of a node: lower-cased `space/name[/file]`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location(String);

impl Location {
    /// Build a location from its raw form. Callers normally obtain locations
    /// from the path resolver rather than constructing them directly.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The space component (everything before the first `/`).
    pub fn space(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    /// Returns `true` if `self` equals `ancestor` or lies below it.
    pub fn is_within(&self, ancestor: &Location) -> bool {
        self.0 == ancestor.0
            || (self.0.starts_with(&ancestor.0) && self.0[ancestor.0.len()..].starts_with('/'))
    }

    /// Swap the `from` prefix of this location for `to`.
    pub fn rebase(&self, from: &Location, to: &Location) -> Option<Location> {
        if !self.is_within(from) {
            return None;
        }
        Some(Self(format!("{}{}", to.0, &self.0[from.0.len()..])))
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({})", self.0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Top-level tree a node lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathRoot {
    /// Saved pages and their attachments.
    Pages,
    /// Placeholders for names that are referenced but were never saved.
    NotCreated,
}

impl PathRoot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pages => "pages",
            Self::NotCreated => "notcreated",
        }
    }
}

impl fmt::Display for PathRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full address of a node: which tree plus where in it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub root: PathRoot,
    pub location: Location,
}

impl NodeKey {
    pub fn new(root: PathRoot, location: Location) -> Self {
        Self { root, location }
    }

    pub fn page(location: Location) -> Self {
        Self::new(PathRoot::Pages, location)
    }

    pub fn not_created(location: Location) -> Self {
        Self::new(PathRoot::NotCreated, location)
    }

    /// Returns `true` if `self` is `ancestor` or one of its descendants.
    pub fn is_within(&self, ancestor: &NodeKey) -> bool {
        self.root == ancestor.root && self.location.is_within(&ancestor.location)
    }

    /// Re-root this key from `from` to `to`, if it lies within `from`.
    pub fn rebase(&self, from: &NodeKey, to: &NodeKey) -> Option<NodeKey> {
        if self.root != from.root {
            return None;
        }
        let location = self.location.rebase(&from.location, &to.location)?;
        Some(Self::new(to.root, location))
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({}:{})", self.root, self.location)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.root, self.location)
    }
}
