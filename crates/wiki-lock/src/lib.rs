//! Advisory page edit locks for the wiki content engine.
//!
//! A [`PageLock`] tells other editors that someone is working on a page. The
//! [`LockManager`] grants at most one lock per page, hands back `None` on
//! contention, and evicts expired locks from a background reaper thread.
//! Locks live only in memory and never block a save.

pub mod lock;
pub mod manager;

pub use lock::PageLock;
pub use manager::{LockConfig, LockManager};
