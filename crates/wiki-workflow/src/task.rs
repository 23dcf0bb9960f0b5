use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::facts::Facts;

/// Error type returned by tasks. Callers downcast it to recover their own
/// error types.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// Task trait
// ---------------------------------------------------------------------------

/// One unit of work in a workflow.
///
/// Tasks run in order. Each receives the caller-supplied context `C` and
/// the workflow's [`Facts`], which it may read and extend. Returning an
/// error stops the workflow.
///
/// The trait is object-safe and `Send + Sync` so tasks can be stored as
/// `Box<dyn Task<C>>`.
pub trait Task<C>: Send + Sync {
    /// Human-readable name of this task (e.g. "prepare-save").
    fn name(&self) -> &str;

    fn execute(&self, context: &C, facts: &mut Facts) -> Result<(), TaskError>;
}

/// A [`Task`] built from a closure.
pub struct FnTask<F> {
    name: String,
    f: F,
}

impl<F> FnTask<F> {
    pub fn new<C>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&C, &mut Facts) -> Result<(), TaskError> + Send + Sync,
    {
        Self { name: name.into(), f }
    }
}

impl<C, F> Task<C> for FnTask<F>
where
    F: Fn(&C, &mut Facts) -> Result<(), TaskError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, context: &C, facts: &mut Facts) -> Result<(), TaskError> {
        (self.f)(context, facts)
    }
}

// ---------------------------------------------------------------------------
// TaskRecord
// ---------------------------------------------------------------------------

/// Recorded result of one task run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task: String,
    pub passed: bool,
    /// Error message on failure.
    pub reason: Option<String>,
    pub elapsed: Duration,
}

/// Run `tasks` in order, fail-fast. Records every task that ran.
pub(crate) fn run_tasks<C>(
    tasks: &[Box<dyn Task<C>>],
    context: &C,
    facts: &mut Facts,
    records: &mut Vec<TaskRecord>,
) -> Result<(), (String, TaskError)> {
    for task in tasks {
        let start = Instant::now();
        let outcome = task.execute(context, facts);
        records.push(TaskRecord {
            task: task.name().to_string(),
            passed: outcome.is_ok(),
            reason: outcome.as_ref().err().map(ToString::to_string),
            elapsed: start.elapsed(),
        });
        outcome.map_err(|e| (task.name().to_string(), e))?;
    }
    Ok(())
}
