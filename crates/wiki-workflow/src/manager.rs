use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Result, WorkflowError};
use crate::facts::{keys, Facts};
use crate::task::{run_tasks, Task};
use crate::workflow::{Workflow, WorkflowId, WorkflowState, WorkflowSummary};

/// Finished workflows kept for [`WorkflowManager::get`], newest last.
pub const FINISHED_LIMIT: usize = 256;

/// Result of [`WorkflowManager::start`] when no task failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// Every task ran; the change took effect.
    Applied(WorkflowId),
    /// Prepare tasks ran; the workflow now waits for a decision.
    Pending(WorkflowId),
}

impl WorkflowOutcome {
    pub fn id(self) -> WorkflowId {
        match self {
            Self::Applied(id) | Self::Pending(id) => id,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// A workflow waiting in the decision queue, with the tasks to run on approval.
struct Instance<C> {
    summary: WorkflowSummary,
    commit: Vec<Box<dyn Task<C>>>,
}

/// Runs workflows and holds the queue of pending decisions.
///
/// The manager never holds its locks while tasks run, so tasks may take as
/// long as they need. At most one workflow per subject can be pending.
/// A workflow's facts are dropped when it reaches a terminal state; only
/// the last [`FINISHED_LIMIT`] finished summaries are kept.
pub struct WorkflowManager<C> {
    next_id: AtomicU64,
    pending: Mutex<BTreeMap<WorkflowId, Instance<C>>>,
    finished: Mutex<VecDeque<WorkflowSummary>>,
}

impl<C> WorkflowManager<C> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(BTreeMap::new()),
            finished: Mutex::new(VecDeque::new()),
        }
    }

    /// Submit `workflow` and run it as far as it can go.
    ///
    /// Prepare tasks run first; a failure aborts the workflow and returns
    /// [`WorkflowError::TaskFailed`]. Without an approver the commit tasks
    /// run immediately. With one, the workflow is queued and
    /// [`WorkflowOutcome::Pending`] is returned.
    pub fn start(&self, workflow: Workflow<C>, context: &C) -> Result<WorkflowOutcome> {
        self.ensure_not_pending(&workflow.subject)?;

        let Workflow {
            name,
            subject,
            owner,
            approver,
            prepare,
            commit,
            facts,
        } = workflow;
        let id = WorkflowId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut summary = WorkflowSummary {
            id,
            name,
            subject,
            owner,
            approver,
            state: WorkflowState::Submitted,
            facts,
            records: Vec::new(),
            submitted: Utc::now(),
            decided_by: None,
            reason: None,
            completed: None,
        };
        debug!(%id, workflow = %summary.name, subject = %summary.subject, "workflow submitted");

        if let Err((task, source)) = run_tasks(&prepare, context, &mut summary.facts, &mut summary.records) {
            summary.reason = Some(source.to_string());
            self.finish(summary, WorkflowState::Aborted);
            return Err(WorkflowError::task(id, task, source));
        }
        summary.state = WorkflowState::Prepared;

        if summary.approver.is_none() {
            self.run_commit(summary, &commit, context)?;
            return Ok(WorkflowOutcome::Applied(id));
        }

        let mut pending = self.pending.lock().expect("lock poisoned");
        let clash = pending
            .values()
            .find(|i| i.summary.subject == summary.subject)
            .map(|i| i.summary.id);
        if let Some(other) = clash {
            drop(pending);
            let err = WorkflowError::AlreadyPending {
                subject: summary.subject.clone(),
                id: other,
            };
            summary.reason = Some(err.to_string());
            self.finish(summary, WorkflowState::Aborted);
            return Err(err);
        }
        summary.state = WorkflowState::DecisionPending;
        info!(
            %id,
            subject = %summary.subject,
            approver = summary.approver.as_deref(),
            "workflow awaiting decision"
        );
        pending.insert(id, Instance { summary, commit });
        Ok(WorkflowOutcome::Pending(id))
    }

    /// Approve a pending workflow and run its commit tasks.
    pub fn approve(&self, id: WorkflowId, actor: &str, context: &C) -> Result<WorkflowSummary> {
        let Instance { mut summary, commit } = self.take_pending(id)?;
        summary.decided_by = Some(actor.to_string());
        summary.facts.insert(keys::DECIDED_BY, actor);
        info!(%id, actor, "workflow approved");
        self.run_commit(summary, &commit, context)
    }

    /// Reject a pending workflow. Its commit tasks never run.
    pub fn reject(&self, id: WorkflowId, actor: &str, reason: &str) -> Result<WorkflowSummary> {
        let Instance { mut summary, .. } = self.take_pending(id)?;
        summary.decided_by = Some(actor.to_string());
        summary.reason = Some(reason.to_string());
        info!(%id, actor, reason, "workflow rejected");
        Ok(self.finish(summary, WorkflowState::Rejected))
    }

    /// Put a persisted pending workflow back into the decision queue.
    pub fn restore(&self, summary: WorkflowSummary, commit: Vec<Box<dyn Task<C>>>) -> Result<()> {
        if summary.state != WorkflowState::DecisionPending {
            return Err(WorkflowError::NotAwaitingDecision {
                id: summary.id,
                state: summary.state,
            });
        }
        let mut pending = self.pending.lock().expect("lock poisoned");
        if let Some(other) = pending.values().find(|i| i.summary.subject == summary.subject) {
            return Err(WorkflowError::AlreadyPending {
                subject: summary.subject.clone(),
                id: other.summary.id,
            });
        }
        self.next_id.fetch_max(summary.id.get() + 1, Ordering::Relaxed);
        debug!(id = %summary.id, subject = %summary.subject, "restored pending workflow");
        pending.insert(summary.id, Instance { summary, commit });
        Ok(())
    }

    /// Every workflow awaiting a decision, oldest first.
    pub fn pending(&self) -> Vec<WorkflowSummary> {
        self.pending
            .lock()
            .expect("lock poisoned")
            .values()
            .map(|i| i.summary.clone())
            .collect()
    }

    /// Pending workflows assigned to `approver`.
    pub fn pending_for(&self, approver: &str) -> Vec<WorkflowSummary> {
        self.pending()
            .into_iter()
            .filter(|s| s.approver.as_deref() == Some(approver))
            .collect()
    }

    /// The workflow awaiting a decision about `subject`, if any.
    pub fn pending_for_subject(&self, subject: &str) -> Option<WorkflowSummary> {
        self.pending
            .lock()
            .expect("lock poisoned")
            .values()
            .find(|i| i.summary.subject == subject)
            .map(|i| i.summary.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("lock poisoned").len()
    }

    /// Look up any workflow this manager has seen.
    pub fn get(&self, id: WorkflowId) -> Option<WorkflowSummary> {
        if let Some(instance) = self.pending.lock().expect("lock poisoned").get(&id) {
            return Some(instance.summary.clone());
        }
        self.finished
            .lock()
            .expect("lock poisoned")
            .iter()
            .rev()
            .find(|s| s.id == id)
            .cloned()
    }

    /// Recently finished workflows, in completion order.
    pub fn finished(&self) -> Vec<WorkflowSummary> {
        self.finished.lock().expect("lock poisoned").iter().cloned().collect()
    }

    fn ensure_not_pending(&self, subject: &str) -> Result<()> {
        match self.pending_for_subject(subject) {
            Some(other) => Err(WorkflowError::AlreadyPending {
                subject: subject.to_string(),
                id: other.id,
            }),
            None => Ok(()),
        }
    }

    fn take_pending(&self, id: WorkflowId) -> Result<Instance<C>> {
        if let Some(instance) = self.pending.lock().expect("lock poisoned").remove(&id) {
            return Ok(instance);
        }
        match self.get(id) {
            Some(summary) => Err(WorkflowError::NotAwaitingDecision {
                id,
                state: summary.state,
            }),
            None => Err(WorkflowError::UnknownWorkflow(id)),
        }
    }

    fn run_commit(
        &self,
        mut summary: WorkflowSummary,
        commit: &[Box<dyn Task<C>>],
        context: &C,
    ) -> Result<WorkflowSummary> {
        match run_tasks(commit, context, &mut summary.facts, &mut summary.records) {
            Ok(()) => Ok(self.finish(summary, WorkflowState::Applied)),
            Err((task, source)) => {
                let id = summary.id;
                summary.reason = Some(source.to_string());
                self.finish(summary, WorkflowState::Aborted);
                Err(WorkflowError::task(id, task, source))
            }
        }
    }

    fn finish(&self, mut summary: WorkflowSummary, state: WorkflowState) -> WorkflowSummary {
        summary.state = state;
        summary.completed = Some(Utc::now());
        let note = summary.facts.get_str(keys::COMMIT_NOTE).map(str::to_string);
        if state == WorkflowState::Applied && note.is_some() {
            summary.reason = note;
        }
        summary.facts = Facts::new();
        match state {
            WorkflowState::Aborted => warn!(
                id = %summary.id,
                subject = %summary.subject,
                reason = summary.reason.as_deref(),
                "workflow aborted"
            ),
            _ => info!(id = %summary.id, subject = %summary.subject, %state, "workflow finished"),
        }
        let mut finished = self.finished.lock().expect("lock poisoned");
        if finished.len() == FINISHED_LIMIT {
            finished.pop_front();
        }
        finished.push_back(summary.clone());
        summary
    }
}

impl<C> Default for WorkflowManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for WorkflowManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowManager")
            .field("pending", &self.pending_count())
            .field("finished", &self.finished.lock().expect("lock poisoned").len())
            .finish()
    }
}
