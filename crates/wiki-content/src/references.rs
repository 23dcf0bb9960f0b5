use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use tracing::debug;
use wiki_resolver::clean_link;
use wiki_types::WikiPath;

use crate::links::referenced_pages;

/// Tracks which pages link to which.
///
/// Consulted by delete (demote vs. remove) and rename (which referrers to
/// rewrite). The content manager keeps it current as pages are saved,
/// deleted, and renamed.
pub trait ReferenceIndex: Send + Sync {
    /// Pages whose current text links to `path`.
    fn referred_by(&self, path: &WikiPath) -> BTreeSet<WikiPath>;

    /// Record the links in the newly saved text of `page`.
    fn update(&self, page: &WikiPath, content: &str);

    /// Forget the outgoing links of `page`.
    fn remove(&self, page: &WikiPath);

    /// Carry the outgoing links of `from` over to `to`.
    fn rename(&self, from: &WikiPath, to: &WikiPath);
}

/// In-memory [`ReferenceIndex`] built by scanning page text for links.
///
/// Targets are compared the way links resolve: space case-insensitively and
/// each name component after cleaning, ignoring case.
pub struct LinkIndex {
    outgoing: RwLock<HashMap<WikiPath, BTreeSet<WikiPath>>>,
    camel_case: bool,
}

impl LinkIndex {
    pub fn new(camel_case: bool) -> Self {
        Self {
            outgoing: RwLock::new(HashMap::new()),
            camel_case,
        }
    }

    /// Everything `page` links to, as last recorded.
    pub fn references(&self, page: &WikiPath) -> BTreeSet<WikiPath> {
        self.outgoing
            .read()
            .expect("lock poisoned")
            .get(page)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of pages with recorded outgoing links.
    pub fn len(&self) -> usize {
        self.outgoing.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.outgoing.write().expect("lock poisoned").clear();
    }
}

impl ReferenceIndex for LinkIndex {
    fn referred_by(&self, path: &WikiPath) -> BTreeSet<WikiPath> {
        let wanted = link_key(path);
        self.outgoing
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|(_, targets)| targets.iter().any(|t| link_key(t) == wanted))
            .map(|(page, _)| page.clone())
            .collect()
    }

    fn update(&self, page: &WikiPath, content: &str) {
        let targets = referenced_pages(content, page.space(), self.camel_case);
        debug!(%page, links = targets.len(), "indexed page links");
        let mut outgoing = self.outgoing.write().expect("lock poisoned");
        if targets.is_empty() {
            outgoing.remove(page);
        } else {
            outgoing.insert(page.clone(), targets);
        }
    }

    fn remove(&self, page: &WikiPath) {
        self.outgoing.write().expect("lock poisoned").remove(page);
    }

    fn rename(&self, from: &WikiPath, to: &WikiPath) {
        let mut outgoing = self.outgoing.write().expect("lock poisoned");
        if let Some(targets) = outgoing.remove(from) {
            outgoing.insert(to.clone(), targets);
        }
    }
}

impl Default for LinkIndex {
    fn default() -> Self {
        Self::new(true)
    }
}

impl std::fmt::Debug for LinkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkIndex")
            .field("pages", &self.len())
            .field("camel_case", &self.camel_case)
            .finish()
    }
}

/// Comparison key for link targets.
fn link_key(path: &WikiPath) -> (String, String) {
    let name: Vec<String> = path
        .path()
        .split('/')
        .map(|c| clean_link(c).to_lowercase())
        .collect();
    (path.space().to_lowercase(), name.join("/"))
}
