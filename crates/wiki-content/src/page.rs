use std::collections::BTreeSet;

use serde_json::Value;
use wiki_store::{NodeId, NodeRecord, VersionedProperties};
use wiki_types::{keys, Acl, Attributes, Timestamp, WikiPath};

/// A page as handed to callers: one version of a stored node.
///
/// Setters only change this in-memory copy; nothing is persisted until the
/// page is passed to [`ContentManager::save`](crate::ContentManager::save).
/// Pages read from version history are read-only snapshots and cannot be
/// saved.
#[derive(Clone, Debug, PartialEq)]
pub struct WikiPage {
    record: NodeRecord,
    latest: bool,
}

impl WikiPage {
    pub(crate) fn live(record: NodeRecord) -> Self {
        Self {
            record,
            latest: true,
        }
    }

    pub(crate) fn historical(live: &NodeRecord, properties: VersionedProperties) -> Self {
        Self {
            record: NodeRecord {
                id: live.id,
                path: live.path.clone(),
                versioned: properties,
                transient: live.transient.clone(),
            },
            latest: false,
        }
    }

    pub(crate) fn record(&self) -> &NodeRecord {
        &self.record
    }

    pub(crate) fn record_mut(&mut self) -> &mut NodeRecord {
        &mut self.record
    }

    pub fn path(&self) -> &WikiPath {
        &self.record.path
    }

    /// Repository identity, stable across renames and demotion.
    pub fn id(&self) -> NodeId {
        self.record.id
    }

    /// Version number; `0` for a page that has never been saved.
    pub fn version(&self) -> u32 {
        self.record.version()
    }

    /// Returns `true` if this is the live version rather than a history entry.
    pub fn is_latest(&self) -> bool {
        self.latest
    }

    /// Returns `true` if the page has never been saved.
    pub fn is_new(&self) -> bool {
        self.record.is_new()
    }

    pub fn content(&self) -> &str {
        &self.record.versioned.content
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.record.versioned.content = content.into();
    }

    pub fn content_type(&self) -> &str {
        &self.record.versioned.content_type
    }

    pub fn title(&self) -> &str {
        &self.record.versioned.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.record.versioned.title = title.into();
    }

    pub fn author(&self) -> Option<&str> {
        self.record.versioned.author.as_deref()
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.record.versioned.author = Some(author.into());
    }

    pub fn created(&self) -> Option<Timestamp> {
        self.record.versioned.created
    }

    pub fn last_modified(&self) -> Option<Timestamp> {
        self.record.versioned.last_modified
    }

    pub fn set_last_modified(&mut self, at: Timestamp) {
        self.record.versioned.last_modified = Some(at);
    }

    pub fn attributes(&self) -> &Attributes {
        &self.record.versioned.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.record.versioned.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.record.versioned.attributes.insert(key.into(), value.into());
    }

    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.record.versioned.attributes = attributes;
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.record.versioned.attributes.remove(key)
    }

    /// The note recorded with the last change, if it is a string.
    pub fn change_note(&self) -> Option<&str> {
        self.attribute(keys::CHANGENOTE).and_then(Value::as_str)
    }

    pub fn acl(&self) -> &Acl {
        &self.record.versioned.acl
    }

    pub fn set_acl(&mut self, acl: Acl) {
        self.record.versioned.acl = acl;
    }

    /// Pages recorded as linking here when this node was last demoted.
    pub fn referred_by(&self) -> &BTreeSet<WikiPath> {
        &self.record.transient.referred_by
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiki_types::WIKI_MARKUP;

    fn page() -> WikiPage {
        WikiPage::live(NodeRecord::new(WikiPath::parse("Foo").unwrap(), WIKI_MARKUP))
    }

    #[test]
    fn fresh_page_is_new_and_latest() {
        let page = page();
        assert!(page.is_new());
        assert!(page.is_latest());
        assert_eq!(page.version(), 0);
        assert_eq!(page.title(), "Foo");
        assert_eq!(page.content(), "");
    }

    #[test]
    fn setters_change_local_copy() {
        let mut page = page();
        page.set_content("hello");
        page.set_author("alice");
        page.set_attribute(keys::CHANGENOTE, "first");
        assert_eq!(page.content(), "hello");
        assert_eq!(page.author(), Some("alice"));
        assert_eq!(page.change_note(), Some("first"));
        assert_eq!(page.remove_attribute(keys::CHANGENOTE), Some(Value::from("first")));
        assert!(page.change_note().is_none());
    }

    #[test]
    fn historical_snapshot_keeps_identity() {
        let live = page();
        let mut old = VersionedProperties::new("Foo", WIKI_MARKUP);
        old.version = 1;
        old.content = "v1".into();
        let snapshot = WikiPage::historical(live.record(), old);
        assert!(!snapshot.is_latest());
        assert_eq!(snapshot.id(), live.id());
        assert_eq!(snapshot.version(), 1);
        assert_eq!(snapshot.content(), "v1");
    }
}
