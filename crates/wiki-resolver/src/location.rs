use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tracing::trace;
use wiki_store::{Location, NodeKey, PathRoot};
use wiki_types::WikiPath;

/// Compute the storage location of `path`: lower-cased `space/name`.
///
/// Pure and stable: the same path always maps to the same location.
pub fn location_of(path: &WikiPath) -> Location {
    Location::new(format!("{}/{}", path.space(), path.path()))
}

/// Maps page paths to storage locations, caching the mapping.
///
/// Callers must [`invalidate`](Self::invalidate) a path whenever a page is
/// created, renamed, or deleted there.
#[derive(Debug, Default)]
pub struct PathResolver {
    cache: RwLock<HashMap<WikiPath, Location>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `path` to its location, consulting the cache first.
    pub fn resolve(&self, path: &WikiPath) -> Location {
        if let Some(location) = self.cache.read().expect("lock poisoned").get(path) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(%path, "location cache hit");
            return location.clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let location = location_of(path);
        self.cache
            .write()
            .expect("lock poisoned")
            .insert(path.clone(), location.clone());
        location
    }

    /// Key of `path` in the saved-pages tree.
    pub fn page_key(&self, path: &WikiPath) -> NodeKey {
        NodeKey::new(PathRoot::Pages, self.resolve(path))
    }

    /// Key of `path` in the staging tree.
    pub fn staging_key(&self, path: &WikiPath) -> NodeKey {
        NodeKey::new(PathRoot::NotCreated, self.resolve(path))
    }

    /// Drop the cached entries for `path` and everything below it.
    pub fn invalidate(&self, path: &WikiPath) {
        let mut cache = self.cache.write().expect("lock poisoned");
        let before = cache.len();
        cache.retain(|cached, _| !cached.is_within(path));
        trace!(%path, dropped = before - cache.len(), "invalidated location cache");
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.cache.write().expect("lock poisoned").clear();
    }

    /// Returns `true` if `path` currently has a cached location.
    pub fn is_cached(&self, path: &WikiPath) -> bool {
        self.cache.read().expect("lock poisoned").contains_key(path)
    }

    /// Cache statistics: (hits, misses).
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> WikiPath {
        WikiPath::parse(s).unwrap()
    }

    #[test]
    fn location_is_stable_and_lower_cased() {
        assert_eq!(location_of(&p("Main:FrontPage")).as_str(), "main/frontpage");
        assert_eq!(location_of(&p("main:FrontPage")), location_of(&p("Main:FrontPage")));
        assert_eq!(location_of(&p("Docs:Page/a.TXT")).as_str(), "docs/page/a.txt");
    }

    #[test]
    fn repeated_lookups_hit_cache() {
        let resolver = PathResolver::new();
        let first = resolver.resolve(&p("Foo"));
        let second = resolver.resolve(&p("Foo"));
        assert_eq!(first, second);
        assert_eq!(resolver.stats(), (1, 1));
    }

    #[test]
    fn invalidate_drops_page_and_attachments() {
        let resolver = PathResolver::new();
        resolver.resolve(&p("Foo"));
        resolver.resolve(&p("Foo/a.txt"));
        resolver.resolve(&p("FooBar"));

        resolver.invalidate(&p("Foo"));
        assert!(!resolver.is_cached(&p("Foo")));
        assert!(!resolver.is_cached(&p("Foo/a.txt")));
        assert!(resolver.is_cached(&p("FooBar")));

        resolver.clear();
        assert!(!resolver.is_cached(&p("FooBar")));
    }

    #[test]
    fn keys_use_the_right_tree() {
        let resolver = PathResolver::new();
        assert_eq!(resolver.page_key(&p("Foo")).root, PathRoot::Pages);
        assert_eq!(resolver.staging_key(&p("Foo")).root, PathRoot::NotCreated);
    }
}
