use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::facts::Facts;
use crate::task::{Task, TaskRecord};

// ---------------------------------------------------------------------------
// WorkflowId
// ---------------------------------------------------------------------------

/// Identifies one workflow instance within a [`WorkflowManager`](crate::WorkflowManager).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(u64);

impl WorkflowId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for WorkflowId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(Self)
    }
}

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

/// Lifecycle of a workflow instance.
///
/// ```text
/// Submitted -> Prepared | Aborted
/// Prepared -> DecisionPending | Applied | Aborted
/// DecisionPending -> Applied | Rejected | Aborted
/// ```
///
/// `Applied`, `Rejected` and `Aborted` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Submitted,
    Prepared,
    DecisionPending,
    Applied,
    Rejected,
    Aborted,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Rejected | Self::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Prepared => "prepared",
            Self::DecisionPending => "decision pending",
            Self::Applied => "applied",
            Self::Rejected => "rejected",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A workflow definition ready to be started.
///
/// Prepare tasks run on submission. If an approver is set, the workflow then
/// waits for a decision; otherwise the commit tasks run straight away.
pub struct Workflow<C> {
    pub(crate) name: String,
    pub(crate) subject: String,
    pub(crate) owner: String,
    pub(crate) approver: Option<String>,
    pub(crate) prepare: Vec<Box<dyn Task<C>>>,
    pub(crate) commit: Vec<Box<dyn Task<C>>>,
    pub(crate) facts: Facts,
}

impl<C> Workflow<C> {
    /// A workflow called `name` about `subject`, submitted by `owner`.
    ///
    /// At most one workflow per subject may await a decision at a time.
    pub fn new(name: impl Into<String>, subject: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            owner: owner.into(),
            approver: None,
            prepare: Vec::new(),
            commit: Vec::new(),
            facts: Facts::new(),
        }
    }

    /// Require a decision from `approver` between prepare and commit.
    pub fn with_approver(mut self, approver: Option<String>) -> Self {
        self.approver = approver;
        self
    }

    pub fn prepare(mut self, task: Box<dyn Task<C>>) -> Self {
        self.prepare.push(task);
        self
    }

    pub fn commit(mut self, task: Box<dyn Task<C>>) -> Self {
        self.commit.push(task);
        self
    }

    pub fn with_facts(mut self, facts: Facts) -> Self {
        self.facts = facts;
        self
    }

    pub fn fact(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.facts.insert(key, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn approver(&self) -> Option<&str> {
        self.approver.as_deref()
    }
}

impl<C> fmt::Debug for Workflow<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("subject", &self.subject)
            .field("owner", &self.owner)
            .field("approver", &self.approver)
            .field("prepare_tasks", &self.prepare.len())
            .field("commit_tasks", &self.commit.len())
            .field("facts", &self.facts.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WorkflowSummary
// ---------------------------------------------------------------------------

/// Serializable view of a workflow instance.
///
/// A summary in the `DecisionPending` state carries everything needed to
/// rebuild the instance with [`WorkflowManager::restore`](crate::WorkflowManager::restore).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    pub subject: String,
    pub owner: String,
    pub approver: Option<String>,
    pub state: WorkflowState,
    pub facts: Facts,
    #[serde(default)]
    pub records: Vec<TaskRecord>,
    pub submitted: DateTime<Utc>,
    #[serde(default)]
    pub decided_by: Option<String>,
    /// Rejection reason, the failing task's message for aborted workflows,
    /// or the commit note of an applied one.
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub completed: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display_and_parse() {
        let id = WorkflowId::new(7);
        assert_eq!(id.to_string(), "#7");
        assert_eq!("#7".parse::<WorkflowId>().unwrap(), id);
        assert_eq!(" 7 ".parse::<WorkflowId>().unwrap(), id);
        assert!("seven".parse::<WorkflowId>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!WorkflowState::Submitted.is_terminal());
        assert!(!WorkflowState::DecisionPending.is_terminal());
        assert!(WorkflowState::Applied.is_terminal());
        assert!(WorkflowState::Rejected.is_terminal());
        assert!(WorkflowState::Aborted.is_terminal());
        assert_eq!(
            serde_json::to_string(&WorkflowState::DecisionPending).unwrap(),
            r#""decision_pending""#
        );
    }

    #[test]
    fn builder_collects_tasks() {
        let wf: Workflow<()> = Workflow::new("save", "Main:Foo", "alice")
            .with_approver(Some("admin".into()))
            .fact("k", 1);
        assert_eq!(wf.name(), "save");
        assert_eq!(wf.subject(), "Main:Foo");
        assert_eq!(wf.approver(), Some("admin"));
        assert_eq!(wf.facts.len(), 1);
        assert!(wf.prepare.is_empty());
    }
}
