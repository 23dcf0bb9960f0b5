use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use wiki_types::{Timestamp, WikiPath};

/// An advisory edit lock on one page.
///
/// Locks only signal that someone is editing; they never block a save.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLock {
    path: WikiPath,
    locker: String,
    acquired: Timestamp,
    expiry: Timestamp,
}

impl PageLock {
    pub fn new(path: WikiPath, locker: impl Into<String>, acquired: Timestamp, expiry: Timestamp) -> Self {
        Self {
            path,
            locker: locker.into(),
            acquired,
            expiry,
        }
    }

    /// The locked page.
    pub fn path(&self) -> &WikiPath {
        &self.path
    }

    /// Who holds the lock (for display).
    pub fn locker(&self) -> &str {
        &self.locker
    }

    pub fn acquired(&self) -> Timestamp {
        self.acquired
    }

    pub fn expiry(&self) -> Timestamp {
        self.expiry
    }

    /// Returns `true` once `now` is past the expiry time.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now > self.expiry
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whole minutes left before expiry, rounded up; zero or negative once
    /// expired.
    pub fn time_left_minutes_at(&self, now: Timestamp) -> i64 {
        let left_ms = (self.expiry - now).num_milliseconds();
        if left_ms < 0 {
            return left_ms / 60_000;
        }
        left_ms / 60_000 + 1
    }

    pub fn time_left_minutes(&self) -> i64 {
        self.time_left_minutes_at(Utc::now())
    }
}

impl fmt::Display for PageLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} locked by {} until {}",
            self.path,
            self.locker,
            self.expiry.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}
