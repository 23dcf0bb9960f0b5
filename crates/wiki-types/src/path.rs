use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Space assumed for names that carry no `Space:` prefix.
pub const DEFAULT_SPACE: &str = "Main";

/// Separator between the space and the page name.
pub const SPACE_SEPARATOR: char = ':';

/// Separator between a page and one of its attachments.
pub const ATTACHMENT_SEPARATOR: char = '/';

/// Identifies a page or an attachment inside a wiki space.
///
/// A `WikiPath` is a space name plus a hierarchical name. Pages have a
/// slash-free name (`Main:FrontPage`); attachments hang below their parent
/// page (`Main:FrontPage/diagram.png`).
///
/// Space names are case-insensitive: `main:Foo` and `Main:Foo` are the same
/// path. The page name keeps its case. The original spelling of the space is
/// retained for display.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WikiPath {
    space: String,
    path: String,
}

impl WikiPath {
    /// Create a path from an explicit space and hierarchical name.
    pub fn new(space: impl Into<String>, path: impl Into<String>) -> Result<Self, TypeError> {
        let space = space.into().trim().to_string();
        let path = path.into().trim().to_string();
        validate_space(&space)?;
        validate_name(&path)?;
        Ok(Self { space, path })
    }

    /// Parse `Space:Name` or a bare `Name` in the default space.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Self::parse_in(s, DEFAULT_SPACE)
    }

    /// Parse `Space:Name`, using `default_space` when no space is given.
    pub fn parse_in(s: &str, default_space: &str) -> Result<Self, TypeError> {
        let s = s.trim();
        match s.split_once(SPACE_SEPARATOR) {
            Some((space, path)) => Self::new(space, path),
            None => Self::new(default_space, s),
        }
    }

    /// The space this path lives in, as originally spelled.
    pub fn space(&self) -> &str {
        &self.space
    }

    /// The full hierarchical name within the space (`Page` or `Page/file`).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The leaf name: the page name, or the file name of an attachment.
    pub fn name(&self) -> &str {
        match self.path.rfind(ATTACHMENT_SEPARATOR) {
            Some(idx) => &self.path[idx + 1..],
            None => &self.path,
        }
    }

    /// Returns `true` if this path names an attachment of another page.
    pub fn is_attachment(&self) -> bool {
        self.path.contains(ATTACHMENT_SEPARATOR)
    }

    /// The parent page of an attachment, or `None` for a top-level page.
    pub fn parent(&self) -> Option<WikiPath> {
        let idx = self.path.rfind(ATTACHMENT_SEPARATOR)?;
        Some(Self {
            space: self.space.clone(),
            path: self.path[..idx].to_string(),
        })
    }

    /// The path of an attachment named `file` below this page.
    pub fn child(&self, file: &str) -> Result<WikiPath, TypeError> {
        Self::new(self.space.clone(), format!("{}/{}", self.path, file.trim()))
    }

    /// Resolve a reference relative to this path's space.
    ///
    /// A reference with an explicit space is parsed as-is; a bare name is
    /// placed in the same space as `self`.
    pub fn resolve(&self, reference: &str) -> Result<WikiPath, TypeError> {
        Self::parse_in(reference, &self.space)
    }

    /// Returns `true` if `self` is `ancestor` or lives below it.
    pub fn is_within(&self, ancestor: &WikiPath) -> bool {
        if !self.same_space(ancestor) {
            return false;
        }
        self.path == ancestor.path
            || (self.path.starts_with(&ancestor.path)
                && self.path[ancestor.path.len()..].starts_with(ATTACHMENT_SEPARATOR))
    }

    /// Re-root this path from `from` to `to`.
    ///
    /// Returns `None` if `self` is not `from` or one of its attachments.
    /// Used to carry attachments along when their parent page moves.
    pub fn rebase(&self, from: &WikiPath, to: &WikiPath) -> Option<WikiPath> {
        if !self.is_within(from) {
            return None;
        }
        let suffix = &self.path[from.path.len()..];
        Some(Self {
            space: to.space.clone(),
            path: format!("{}{}", to.path, suffix),
        })
    }

    /// Space names compare by Unicode lowercase, in `Eq`, `Ord` and `Hash` alike.
    fn space_key(&self) -> impl Iterator<Item = char> + '_ {
        self.space.chars().flat_map(char::to_lowercase)
    }

    fn same_space(&self, other: &WikiPath) -> bool {
        self.space_key().eq(other.space_key())
    }
}

fn validate_space(space: &str) -> Result<(), TypeError> {
    if space.is_empty() {
        return Err(TypeError::path(space, "space name must not be empty"));
    }
    if space.contains(SPACE_SEPARATOR) || space.contains(ATTACHMENT_SEPARATOR) {
        return Err(TypeError::path(space, "space name must not contain ':' or '/'"));
    }
    Ok(())
}

fn validate_name(path: &str) -> Result<(), TypeError> {
    if path.is_empty() {
        return Err(TypeError::path(path, "page name must not be empty"));
    }
    if path.contains(SPACE_SEPARATOR) {
        return Err(TypeError::path(path, "page name must not contain ':'"));
    }
    if path.starts_with(ATTACHMENT_SEPARATOR) || path.ends_with(ATTACHMENT_SEPARATOR) {
        return Err(TypeError::path(path, "must not start or end with '/'"));
    }
    if path.split(ATTACHMENT_SEPARATOR).any(|c| c.trim().is_empty()) {
        return Err(TypeError::path(path, "path components must not be empty"));
    }
    Ok(())
}

impl PartialEq for WikiPath {
    fn eq(&self, other: &Self) -> bool {
        self.same_space(other) && self.path == other.path
    }
}

impl Eq for WikiPath {}

impl Hash for WikiPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.space_key() {
            c.hash(state);
        }
        state.write_u8(0xff);
        self.path.hash(state);
    }
}

impl PartialOrd for WikiPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WikiPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.space_key()
            .cmp(other.space_key())
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl fmt::Debug for WikiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WikiPath({}:{})", self.space, self.path)
    }
}

impl fmt::Display for WikiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.path)
    }
}

impl FromStr for WikiPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WikiPath {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WikiPath> for String {
    fn from(path: WikiPath) -> Self {
        path.to_string()
    }
}
