use crate::task::TaskError;
use crate::workflow::{WorkflowId, WorkflowState};

/// Errors raised while running or deciding a workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A task returned an error. The workflow was aborted.
    #[error("task '{task}' of workflow {workflow} failed: {source}")]
    TaskFailed {
        workflow: WorkflowId,
        task: String,
        #[source]
        source: TaskError,
    },

    /// No workflow with this id was ever started.
    #[error("unknown workflow {0}")]
    UnknownWorkflow(WorkflowId),

    /// The workflow exists but is not waiting for approval.
    #[error("workflow {id} is {state}, not awaiting a decision")]
    NotAwaitingDecision { id: WorkflowId, state: WorkflowState },

    /// Another workflow for the same subject is still awaiting a decision.
    #[error("workflow {id} is already awaiting a decision for {subject}")]
    AlreadyPending { subject: String, id: WorkflowId },
}

impl WorkflowError {
    pub(crate) fn task(workflow: WorkflowId, task: impl Into<String>, source: TaskError) -> Self {
        Self::TaskFailed {
            workflow,
            task: task.into(),
            source,
        }
    }

    /// The error returned by the failing task, if this is a task failure.
    pub fn task_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::TaskFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// Take the failing task's error out of a task failure.
    pub fn into_task_source(self) -> std::result::Result<TaskError, Self> {
        match self {
            Self::TaskFailed { source, .. } => Ok(source),
            other => Err(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
