//! Content change notifications for the wiki content engine.
//!
//! The content layer publishes a [`ContentEvent`] whenever a page is saved,
//! deleted, renamed, locked, or unlocked. External collaborators (reference
//! indexes, search, caches) subscribe through the [`EventBus`] with an
//! [`EventFilter`] and receive matching events over a broadcast channel.

pub mod bus;
pub mod event;

pub use bus::{EventBus, EventFilter, EventStream};
pub use event::{ContentEvent, EventKind};
