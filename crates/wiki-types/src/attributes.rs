use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Wall-clock timestamp used for creation and modification times.
pub type Timestamp = DateTime<Utc>;

/// Free-form page attributes.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Well-known attribute keys.
pub mod keys {
    /// Human-readable note describing the most recent change.
    pub const CHANGENOTE: &str = "changenote";
    /// Set on a page whose last save was approved by a workflow.
    pub const APPROVED_BY: &str = "approved-by";
}

/// Content type of ordinary wiki markup pages.
pub const WIKI_MARKUP: &str = "text/x-wiki";
