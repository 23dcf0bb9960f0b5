use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use wiki_events::{ContentEvent, EventBus, EventKind};
use wiki_types::{Timestamp, WikiPath};

use crate::lock::PageLock;

/// Lock table shared between request threads and the reaper.
type LockTable = Arc<Mutex<HashMap<WikiPath, PageLock>>>;

/// Configuration for the [`LockManager`].
#[derive(Clone, Debug)]
pub struct LockConfig {
    /// How long a granted lock stays live.
    pub expiry: Duration,
    /// How often the reaper scans for expired locks.
    pub reaper_interval: StdDuration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::minutes(60),
            reaper_interval: StdDuration::from_secs(60),
        }
    }
}

/// Handle to the running reaper thread.
struct Reaper {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Grants and releases advisory per-page edit locks.
///
/// At most one lock exists per page. Expired locks are evicted by a
/// background reaper thread, started on the first [`lock_page`] call and
/// stopped when the manager is dropped.
///
/// [`lock_page`]: LockManager::lock_page
pub struct LockManager {
    locks: LockTable,
    config: LockConfig,
    events: Option<Arc<EventBus>>,
    reaper: Mutex<Option<Reaper>>,
}

impl LockManager {
    pub fn new(config: LockConfig) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            config,
            events: None,
            reaper: Mutex::new(None),
        }
    }

    /// Publish `PageLocked`/`PageUnlocked` events on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Try to lock `path` for `user`.
    ///
    /// Returns `None` if any lock, live or not yet reaped, already exists
    /// for the page.
    pub fn lock_page(&self, path: &WikiPath, user: &str) -> Option<PageLock> {
        self.ensure_reaper();

        let lock = {
            let mut locks = self.locks.lock().expect("lock poisoned");
            if let Some(existing) = locks.get(path) {
                debug!(%path, holder = existing.locker(), "lock already held");
                return None;
            }
            let now = Utc::now();
            let lock = PageLock::new(path.clone(), user, now, now + self.config.expiry);
            locks.insert(path.clone(), lock.clone());
            lock
        };

        debug!(%path, user, expiry = %lock.expiry(), "lock granted");
        self.publish(EventKind::PageLocked, path, user);
        Some(lock)
    }

    /// Release `lock`. A `None` lock, or one already gone, is ignored.
    pub fn unlock_page(&self, lock: Option<&PageLock>) {
        let Some(lock) = lock else { return };
        let removed = self
            .locks
            .lock()
            .expect("lock poisoned")
            .remove(lock.path())
            .is_some();
        debug!(path = %lock.path(), removed, "lock released");
        if removed {
            self.publish(EventKind::PageUnlocked, lock.path(), lock.locker());
        }
    }

    /// The lock currently held on `path`, if any.
    pub fn current_lock(&self, path: &WikiPath) -> Option<PageLock> {
        self.locks.lock().expect("lock poisoned").get(path).cloned()
    }

    /// Snapshot of all locks, ordered by page.
    ///
    /// Informational only: entries may expire right after the call.
    pub fn active_locks(&self) -> Vec<PageLock> {
        let mut locks: Vec<PageLock> = self
            .locks
            .lock()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect();
        locks.sort_by(|a, b| a.path().cmp(b.path()));
        locks
    }

    /// Run one reaper pass as of `now`, returning the evicted locks.
    pub fn reap_expired_at(&self, now: Timestamp) -> Vec<PageLock> {
        reap(&self.locks, now)
    }

    /// Returns `true` once the reaper thread has been started.
    pub fn reaper_running(&self) -> bool {
        self.reaper.lock().expect("lock poisoned").is_some()
    }

    fn ensure_reaper(&self) {
        let mut reaper = self.reaper.lock().expect("lock poisoned");
        if reaper.is_some() {
            return;
        }

        let (tx, rx) = mpsc::channel::<()>();
        let locks = Arc::clone(&self.locks);
        let interval = self.config.reaper_interval;
        let spawned = thread::Builder::new()
            .name("lock-reaper".into())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        reap(&locks, Utc::now());
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match spawned {
            Ok(handle) => {
                debug!(interval_secs = interval.as_secs(), "lock reaper started");
                *reaper = Some(Reaper {
                    shutdown: tx,
                    handle,
                });
            }
            Err(e) => warn!(error = %e, "could not start lock reaper; expired locks stay until released"),
        }
    }

    fn publish(&self, kind: EventKind, path: &WikiPath, user: &str) {
        if let Some(bus) = &self.events {
            bus.publish(ContentEvent::new(kind, path.clone()).with_actor(user));
        }
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        let reaper = self.reaper.get_mut().map(Option::take).unwrap_or_default();
        if let Some(reaper) = reaper {
            let _ = reaper.shutdown.send(());
            let _ = reaper.handle.join();
        }
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("locks", &self.locks.lock().map(|l| l.len()).unwrap_or(0))
            .field("expiry_minutes", &self.config.expiry.num_minutes())
            .finish()
    }
}

fn reap(locks: &Mutex<HashMap<WikiPath, PageLock>>, now: Timestamp) -> Vec<PageLock> {
    let mut locks = locks.lock().expect("lock poisoned");
    let expired: Vec<WikiPath> = locks
        .values()
        .filter(|l| l.is_expired_at(now))
        .map(|l| l.path().clone())
        .collect();
    expired
        .into_iter()
        .filter_map(|path| locks.remove(&path))
        .inspect(|lock| info!(%lock, "reaped lock"))
        .collect()
}
