use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use wiki_types::{Timestamp, WikiPath};

/// Classification of content events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A page or attachment was saved (including version deletion).
    Saved,
    /// A page is about to be deleted.
    DeleteRequested,
    /// A page was deleted or demoted to the staging area.
    Deleted,
    /// A page was renamed; the event's `previous` holds the old path.
    Renamed,
    /// An edit lock was granted.
    PageLocked,
    /// An edit lock was released.
    PageUnlocked,
}

impl EventKind {
    /// Returns `true` for kinds that change the page tree.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Saved | Self::DeleteRequested | Self::Deleted | Self::Renamed
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Saved => "Saved",
            Self::DeleteRequested => "DeleteRequested",
            Self::Deleted => "Deleted",
            Self::Renamed => "Renamed",
            Self::PageLocked => "PageLocked",
            Self::PageUnlocked => "PageUnlocked",
        };
        write!(f, "{s}")
    }
}

/// A single notification about a page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEvent {
    /// Per-bus sequence number, assigned on publish.
    pub seq: u64,
    pub kind: EventKind,
    /// The page the event is about (the new path for renames).
    pub path: WikiPath,
    /// The old path of a renamed page.
    pub previous: Option<WikiPath>,
    /// Who caused the event, when known.
    pub actor: Option<String>,
    pub at: Timestamp,
}

impl ContentEvent {
    pub fn new(kind: EventKind, path: WikiPath) -> Self {
        Self {
            seq: 0,
            kind,
            path,
            previous: None,
            actor: None,
            at: Utc::now(),
        }
    }

    pub fn saved(path: WikiPath) -> Self {
        Self::new(EventKind::Saved, path)
    }

    pub fn delete_requested(path: WikiPath) -> Self {
        Self::new(EventKind::DeleteRequested, path)
    }

    pub fn deleted(path: WikiPath) -> Self {
        Self::new(EventKind::Deleted, path)
    }

    pub fn renamed(from: WikiPath, to: WikiPath) -> Self {
        Self {
            previous: Some(from),
            ..Self::new(EventKind::Renamed, to)
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

impl fmt::Display for ContentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {}", self.seq, self.kind, self.path)?;
        if let Some(previous) = &self.previous {
            write!(f, " (from {previous})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> WikiPath {
        WikiPath::parse(s).unwrap()
    }

    #[test]
    fn renamed_carries_old_path() {
        let event = ContentEvent::renamed(p("Old"), p("New"));
        assert_eq!(event.kind, EventKind::Renamed);
        assert_eq!(event.path, p("New"));
        assert_eq!(event.previous, Some(p("Old")));
        assert_eq!(event.to_string(), "#0 Renamed Main:New (from Main:Old)");
    }

    #[test]
    fn structural_kinds() {
        assert!(EventKind::Deleted.is_structural());
        assert!(!EventKind::PageLocked.is_structural());
    }

    #[test]
    fn serde_json_shape() {
        let event = ContentEvent::saved(p("Foo")).with_actor("alice");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "Saved");
        assert_eq!(json["path"], "Main:Foo");
        assert_eq!(json["actor"], "alice");
    }
}
