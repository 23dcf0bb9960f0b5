use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known fact names shared by the built-in save tasks.
pub mod keys {
    /// Page the workflow is about.
    pub const PAGE_NAME: &str = "fact.pageName";
    /// Human-readable diff of current vs. proposed text.
    pub const DIFF_TEXT: &str = "fact.diffText";
    /// Text as submitted, after pre-save filtering.
    pub const PROPOSED_TEXT: &str = "fact.proposedText";
    /// Text of the page when the workflow was submitted.
    pub const CURRENT_TEXT: &str = "fact.currentText";
    /// Whether the submitter was authenticated.
    pub const IS_AUTHENTICATED: &str = "fact.isAuthenticated";
    /// Who approved the workflow; set just before the commit tasks run.
    pub const DECIDED_BY: &str = "fact.decidedBy";
    /// Left by a commit task whose change stands despite a late problem.
    /// Becomes the `reason` of the applied workflow.
    pub const COMMIT_NOTE: &str = "fact.commitNote";
}

/// Named values attached to one workflow instance.
///
/// Facts are the only state that crosses from the prepare tasks to the
/// commit tasks, so everything a commit needs must be stashed here.
/// Values are JSON so the bag can be persisted with a pending decision.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Facts(BTreeMap<String, Value>);

impl Facts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Store any serializable value.
    pub fn insert_as<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> serde_json::Result<()> {
        self.0.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Deserialize a stored value. `None` if absent; an error if the value
    /// has the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> serde_json::Result<Option<T>> {
        self.get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}
