use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Selects a version of a page.
///
/// Version numbers start at 1 and increase by one on every save.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageVersion {
    /// The live, current version.
    #[default]
    Latest,
    /// A specific version number.
    Exact(u32),
}

impl PageVersion {
    /// The first version a page receives on its initial save.
    pub const FIRST: u32 = 1;

    /// Build an exact version, rejecting zero and negative numbers.
    pub fn exact(number: i64) -> Result<Self, TypeError> {
        match u32::try_from(number) {
            Ok(n) if n >= Self::FIRST => Ok(Self::Exact(n)),
            _ => Err(TypeError::InvalidVersion(number)),
        }
    }

    /// Returns `true` for the `Latest` sentinel.
    pub fn is_latest(&self) -> bool {
        matches!(self, Self::Latest)
    }

    /// The explicit version number, if any.
    pub fn number(&self) -> Option<u32> {
        match self {
            Self::Latest => None,
            Self::Exact(n) => Some(*n),
        }
    }
}

impl From<u32> for PageVersion {
    fn from(n: u32) -> Self {
        Self::Exact(n)
    }
}

impl fmt::Display for PageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Exact(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for PageVersion {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        let n: i64 = s.parse().map_err(|_| TypeError::InvalidVersion(-1))?;
        Self::exact(n)
    }
}
