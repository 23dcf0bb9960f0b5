//! Alternate-name resolution.
//!
//! When a requested page does not exist, the [`ResolverChain`] asks each
//! [`NameResolver`] in turn for candidate names. The first candidate that is
//! accepted wins.

use std::collections::HashMap;

use tracing::debug;
use wiki_types::WikiPath;

/// A name proposed by a resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub path: WikiPath,
    /// Whether the candidate only counts if a page exists there.
    pub must_exist: bool,
}

/// One strategy for finding an alternate name for a missing page.
pub trait NameResolver: Send + Sync {
    /// Short resolver name for logging.
    fn name(&self) -> &'static str;

    /// Candidate names for `path`, most preferred first.
    fn candidates(&self, path: &WikiPath) -> Vec<Candidate>;
}

/// Maps reserved page names to fixed targets.
///
/// Lookups ignore case. Targets are accepted whether or not a page exists
/// there.
#[derive(Debug, Default)]
pub struct SpecialNameResolver {
    targets: HashMap<String, WikiPath>,
}

impl SpecialNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` as a special page resolving to `target`.
    pub fn insert(&mut self, name: &str, target: WikiPath) {
        self.targets.insert(name.to_lowercase(), target);
    }

    /// The target for `name`, if it is special.
    pub fn target(&self, name: &str) -> Option<&WikiPath> {
        self.targets.get(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl NameResolver for SpecialNameResolver {
    fn name(&self) -> &'static str {
        "special"
    }

    fn candidates(&self, path: &WikiPath) -> Vec<Candidate> {
        self.target(path.path())
            .map(|target| Candidate {
                path: target.clone(),
                must_exist: false,
            })
            .into_iter()
            .collect()
    }
}

/// Tries the singular or plural English spelling of a name.
///
/// `Dogs` yields `Dog`; `Dog` yields `Dogs`.
#[derive(Debug, Default)]
pub struct EnglishPluralResolver;

impl NameResolver for EnglishPluralResolver {
    fn name(&self) -> &'static str {
        "english-plural"
    }

    fn candidates(&self, path: &WikiPath) -> Vec<Candidate> {
        let name = path.path();
        let alternate = match name.strip_suffix('s') {
            Some(singular) if !singular.is_empty() => singular.to_string(),
            Some(_) => return Vec::new(),
            None => format!("{name}s"),
        };
        WikiPath::new(path.space(), alternate)
            .map(|path| Candidate {
                path,
                must_exist: true,
            })
            .into_iter()
            .collect()
    }
}

/// Ordered list of name resolvers.
#[derive(Default)]
pub struct ResolverChain {
    resolvers: Vec<Box<dyn NameResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolver; earlier resolvers take precedence.
    pub fn push(&mut self, resolver: impl NameResolver + 'static) {
        self.resolvers.push(Box::new(resolver));
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Find the first acceptable alternate for `path`.
    ///
    /// `exists` is consulted for candidates that must name an existing page;
    /// its errors abort resolution.
    pub fn resolve<E>(
        &self,
        path: &WikiPath,
        mut exists: impl FnMut(&WikiPath) -> Result<bool, E>,
    ) -> Result<Option<WikiPath>, E> {
        for resolver in &self.resolvers {
            for candidate in resolver.candidates(path) {
                if !candidate.must_exist || exists(&candidate.path)? {
                    debug!(
                        %path,
                        resolved = %candidate.path,
                        resolver = resolver.name(),
                        "resolved alternate page name"
                    );
                    return Ok(Some(candidate.path));
                }
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.resolvers.iter().map(|r| r.name()).collect();
        f.debug_struct("ResolverChain")
            .field("resolvers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::convert::Infallible;

    use super::*;

    fn p(s: &str) -> WikiPath {
        WikiPath::parse(s).unwrap()
    }

    fn chain_with_special() -> ResolverChain {
        let mut special = SpecialNameResolver::new();
        special.insert("RecentChanges", p("System:RecentChanges"));
        let mut chain = ResolverChain::new();
        chain.push(special);
        chain.push(EnglishPluralResolver);
        chain
    }

    #[test]
    fn special_name_wins_without_existence() {
        let chain = chain_with_special();
        let resolved = chain
            .resolve(&p("recentchanges"), |_| Ok::<_, Infallible>(false))
            .unwrap();
        assert_eq!(resolved, Some(p("System:RecentChanges")));
    }

    #[test]
    fn plural_requires_existing_page() {
        let chain = chain_with_special();
        let existing: HashSet<WikiPath> = [p("Dog"), p("Cats")].into_iter().collect();
        let exists = |path: &WikiPath| Ok::<_, Infallible>(existing.contains(path));

        assert_eq!(chain.resolve(&p("Dogs"), exists).unwrap(), Some(p("Dog")));
        assert_eq!(chain.resolve(&p("Cat"), exists).unwrap(), Some(p("Cats")));
        assert_eq!(chain.resolve(&p("Bird"), exists).unwrap(), None);
    }

    #[test]
    fn plural_keeps_space() {
        let candidates = EnglishPluralResolver.candidates(&p("Docs:Guides"));
        assert_eq!(candidates[0].path, p("Docs:Guide"));
        assert!(EnglishPluralResolver.candidates(&p("s")).is_empty());
    }

    #[test]
    fn existence_errors_propagate() {
        let chain = chain_with_special();
        let result = chain.resolve(&p("Dogs"), |_| Err::<bool, _>("backend down"));
        assert_eq!(result, Err("backend down"));
    }

    #[test]
    fn empty_chain_resolves_nothing() {
        let chain = ResolverChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.resolve(&p("Foo"), |_| Ok::<_, Infallible>(true)).unwrap(), None);
    }
}
