use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use wiki_types::{Acl, Attributes, Timestamp, WikiPath};

/// Stable repository identity of a node (UUID v7).
///
/// Survives moves and demotion to the staging tree, so caches can tell a
/// re-created page apart from the one they remember.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(uuid::Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short_id())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Properties that are copied into version history on checkin.
///
/// Everything a reader needs to reconstruct a past version lives here.
/// Anything else on [`NodeRecord`] is transient and never versioned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionedProperties {
    pub content_type: String,
    /// Version number; `0` until the first save.
    pub version: u32,
    pub created: Option<Timestamp>,
    pub last_modified: Option<Timestamp>,
    pub author: Option<String>,
    pub title: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub acl: Acl,
    #[serde(default)]
    pub content: String,
}

impl VersionedProperties {
    pub fn new(title: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            version: 0,
            created: None,
            last_modified: None,
            author: None,
            title: title.into(),
            attributes: Attributes::new(),
            acl: Acl::new(),
            content: String::new(),
        }
    }
}

/// Bookkeeping that belongs to the node but not to any version.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransientProperties {
    /// Pages known to link here. Kept on staging placeholders so that a
    /// later re-creation inherits its back-references.
    #[serde(default)]
    pub referred_by: BTreeSet<WikiPath>,
}

/// The stored record for one page or attachment at its current version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub path: WikiPath,
    pub versioned: VersionedProperties,
    #[serde(default)]
    pub transient: TransientProperties,
}

impl NodeRecord {
    /// A fresh, never-saved node whose title is the path's leaf name.
    pub fn new(path: WikiPath, content_type: impl Into<String>) -> Self {
        let title = path.name().to_string();
        Self {
            id: NodeId::new(),
            path,
            versioned: VersionedProperties::new(title, content_type),
            transient: TransientProperties::default(),
        }
    }

    /// A node that has never been saved has no creation timestamp.
    pub fn is_new(&self) -> bool {
        self.versioned.created.is_none()
    }

    pub fn version(&self) -> u32 {
        self.versioned.version
    }

    /// Strip everything except what a staging placeholder keeps:
    /// identity, title, content type, and inbound references.
    pub fn into_placeholder(self) -> Self {
        let versioned = VersionedProperties::new(self.versioned.title, self.versioned.content_type);
        Self {
            id: self.id,
            path: self.path,
            versioned,
            transient: self.transient,
        }
    }
}
