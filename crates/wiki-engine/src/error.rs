use thiserror::Error;

use wiki_content::ContentError;
use wiki_store::StoreError;
use wiki_workflow::{WorkflowError, WorkflowId};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Content(#[from] ContentError),

    /// The save was accepted for review and has not taken effect yet.
    #[error("changes to {page} must be approved before they become active (workflow {workflow_id})")]
    DecisionRequired { page: String, workflow_id: WorkflowId },

    #[error("filter '{filter}' rejected the change: {message}")]
    FilterRejected { filter: String, message: String },

    #[error("workflow error: {0}")]
    Workflow(WorkflowError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("approval queue is unreadable: {0}")]
    Queue(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Content(e) if e.is_not_found())
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Content(e) if e.is_already_exists())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::Content(e) if e.is_invalid_argument())
    }

    pub fn is_decision_required(&self) -> bool {
        matches!(self, Self::DecisionRequired { .. })
    }

    /// Returns `true` if another save of the same page awaits a decision.
    pub fn is_already_pending(&self) -> bool {
        matches!(self, Self::Workflow(WorkflowError::AlreadyPending { .. }))
    }
}

/// Task failures carrying an [`EngineError`] are unwrapped so callers see
/// the filter rejection or content error itself.
impl From<WorkflowError> for EngineError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::TaskFailed {
                workflow,
                task,
                source,
            } => match source.downcast::<EngineError>() {
                Ok(engine) => *engine,
                Err(source) => Self::Workflow(WorkflowError::TaskFailed {
                    workflow,
                    task,
                    source,
                }),
            },
            other => Self::Workflow(other),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        Self::Content(err.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use wiki_workflow::TaskError;

    #[test]
    fn task_failures_unwrap_engine_errors() {
        let source: TaskError = Box::new(EngineError::FilterRejected {
            filter: "spam".into(),
            message: "no".into(),
        });
        let err: EngineError = WorkflowError::TaskFailed {
            workflow: WorkflowId::new(1),
            task: "prepare".into(),
            source,
        }
        .into();
        assert!(matches!(err, EngineError::FilterRejected { ref filter, .. } if filter == "spam"));
    }

    #[test]
    fn foreign_task_failures_stay_wrapped() {
        let err: EngineError = WorkflowError::TaskFailed {
            workflow: WorkflowId::new(1),
            task: "prepare".into(),
            source: "boom".into(),
        }
        .into();
        assert!(matches!(err, EngineError::Workflow(WorkflowError::TaskFailed { .. })));
    }

    #[test]
    fn content_helpers() {
        let err = EngineError::from(ContentError::AlreadyExists("Main:Foo".into()));
        assert!(err.is_already_exists());
        assert!(!err.is_not_found());
    }
}
