use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use wiki_types::WikiPath;

use crate::event::{ContentEvent, EventKind};

/// Filter for subscribing to a subset of content events.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// If set, only events about these pages (or their attachments) are
    /// delivered. A rename matches on either its old or new path.
    pub paths: Option<Vec<WikiPath>>,
    /// Event kinds to deliver; `None` delivers every kind.
    pub kinds: Option<Vec<EventKind>>,
    /// If set, only events in this space are delivered.
    pub space: Option<String>,
}

impl EventFilter {
    /// Filter that accepts the given kinds only.
    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Whether `event` passes every populated criterion.
    pub fn matches(&self, event: &ContentEvent) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(ref space) = self.space {
            if !event.path.space().eq_ignore_ascii_case(space) {
                return false;
            }
        }
        if let Some(ref paths) = self.paths {
            let hit = |p: &WikiPath| paths.iter().any(|want| p.is_within(want));
            if !hit(&event.path) && !event.previous.as_ref().is_some_and(hit) {
                return false;
            }
        }
        true
    }
}

/// A broadcast channel receiver for content events.
pub type EventStream = broadcast::Receiver<ContentEvent>;

/// One subscription and the channel feeding it.
struct Subscriber {
    filter: EventFilter,
    sender: broadcast::Sender<ContentEvent>,
}

/// Fan-out bus that delivers content events to matching subscribers.
///
/// Publishing never blocks and never fails: subscribers that have gone away
/// are pruned, and slow subscribers lose the oldest events once their
/// channel is full.
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    capacity: usize,
    next_seq: AtomicU64,
}

impl EventBus {
    /// Default capacity of per-subscriber channels.
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Open a stream of the events `filter` accepts.
    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        let (tx, rx) = broadcast::channel(self.capacity);
        self.subscribers
            .write()
            .expect("lock poisoned")
            .push(Subscriber { filter, sender: tx });
        rx
    }

    /// Stamp `event` with the next sequence number and route it.
    pub fn publish(&self, mut event: ContentEvent) -> ContentEvent {
        event.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.subscribers.write().expect("lock poisoned");
        subs.retain(|sub| {
            if sub.filter.matches(&event) {
                sub.sender.send(event.clone()).is_ok()
            } else {
                sub.sender.receiver_count() > 0
            }
        });
        debug!(seq = event.seq, kind = %event.kind, path = %event.path, "event published");
        event
    }

    /// Current number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("lock poisoned").len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> WikiPath {
        WikiPath::parse(s).unwrap()
    }

    #[test]
    fn filtered_subscriber_sees_saves() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe(EventFilter::kinds([EventKind::Saved]));
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(ContentEvent::saved(p("Foo")));
        bus.publish(ContentEvent::deleted(p("Foo")));

        let received = stream.try_recv().unwrap();
        assert_eq!(received.kind, EventKind::Saved);
        assert!(stream.try_recv().is_err());
    }

    #[test]
    fn sequence_numbers_increase() {
        let bus = EventBus::new();
        let a = bus.publish(ContentEvent::saved(p("A")));
        let b = bus.publish(ContentEvent::saved(p("B")));
        assert!(b.seq > a.seq);
    }

    #[test]
    fn path_filter_covers_attachments_and_renames() {
        let filter = EventFilter {
            paths: Some(vec![p("TestPage")]),
            ..Default::default()
        };
        assert!(filter.matches(&ContentEvent::saved(p("TestPage/foo.txt"))));
        assert!(filter.matches(&ContentEvent::renamed(p("TestPage"), p("FooTest"))));
        assert!(!filter.matches(&ContentEvent::saved(p("TestPage2"))));
    }

    #[test]
    fn space_filter() {
        let filter = EventFilter {
            space: Some("docs".into()),
            ..Default::default()
        };
        assert!(filter.matches(&ContentEvent::saved(p("Docs:Install"))));
        assert!(!filter.matches(&ContentEvent::saved(p("Main:Install"))));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let stream = bus.subscribe(EventFilter::default());
        let _kept = bus.subscribe(EventFilter::default());
        drop(stream);

        bus.publish(ContentEvent::saved(p("Foo")));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        let event = bus.publish(ContentEvent::deleted(p("Foo")));
        assert_eq!(event.kind, EventKind::Deleted);
    }
}
