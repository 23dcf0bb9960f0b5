use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use wiki_types::DEFAULT_SPACE;

use crate::error::{EngineError, EngineResult};

/// Where page content is stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Nothing survives a restart.
    #[default]
    Memory,
    /// JSON files under `root`.
    File { root: PathBuf },
}

/// Engine configuration, usually read from a TOML file.
///
/// ```toml
/// lock_expiry_minutes = 30
/// save_approver = "admin"
///
/// [backend]
/// kind = "file"
/// root = "/var/lib/wiki"
///
/// [special_pages]
/// RecentChanges = "System:RecentChanges"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub lock_expiry_minutes: u32,
    pub reaper_interval_secs: u64,
    /// Allow saving empty text to a page that does not exist yet.
    pub allow_empty_pages: bool,
    /// Principal whose approval every page save needs. `None` applies saves
    /// immediately.
    pub save_approver: Option<String>,
    /// Resolve missing pages to their English singular or plural form.
    pub match_plurals: bool,
    /// Treat bare CamelCase words as links.
    pub camel_case_links: bool,
    pub default_space: String,
    pub backend: BackendConfig,
    /// Reserved page names and the paths they resolve to.
    pub special_pages: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_expiry_minutes: 60,
            reaper_interval_secs: 60,
            allow_empty_pages: false,
            save_approver: None,
            match_plurals: false,
            camel_case_links: true,
            default_space: DEFAULT_SPACE.to_string(),
            backend: BackendConfig::Memory,
            special_pages: default_special_pages(),
        }
    }
}

impl EngineConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    /// Parse and validate TOML configuration text.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.lock_expiry_minutes == 0 {
            return Err(EngineError::Config("lock_expiry_minutes must be positive".into()));
        }
        if self.reaper_interval_secs == 0 {
            return Err(EngineError::Config("reaper_interval_secs must be positive".into()));
        }
        if self.default_space.trim().is_empty() {
            return Err(EngineError::Config("default_space must not be empty".into()));
        }
        if self.save_approver.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(EngineError::Config("save_approver must not be blank".into()));
        }
        Ok(())
    }

    /// A memory-backed configuration with the given approver.
    pub fn with_approver(approver: impl Into<String>) -> Self {
        Self {
            save_approver: Some(approver.into()),
            ..Self::default()
        }
    }
}

fn default_special_pages() -> BTreeMap<String, String> {
    [
        ("RecentChanges", "System:RecentChanges"),
        ("FindPage", "System:Search"),
        ("UserPreferences", "System:Preferences"),
        ("Login", "System:Login"),
    ]
    .into_iter()
    .map(|(name, target)| (name.to_string(), target.to_string()))
    .collect()
}
