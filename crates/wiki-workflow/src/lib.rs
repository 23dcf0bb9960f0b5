//! Approval workflow for content changes.
//!
//! A [`Workflow`] is a list of prepare tasks, an optional approver, and a
//! list of commit tasks, sharing a bag of [`Facts`]. The
//! [`WorkflowManager`] runs the prepare tasks on submission. Without an
//! approver it goes straight on to the commit tasks; with one, the workflow
//! waits in the decision queue until it is approved or rejected.
//!
//! ```text
//! Submitted -> Prepared | Aborted
//! Prepared -> DecisionPending | Applied | Aborted
//! DecisionPending -> Applied | Rejected | Aborted
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use wiki_workflow::{FnTask, Facts, Workflow, WorkflowManager, WorkflowOutcome};
//!
//! let manager: WorkflowManager<()> = WorkflowManager::new();
//! let workflow = Workflow::new("saveWikiPage", "Main:Foo", "alice")
//!     .with_approver(Some("admin".into()))
//!     .prepare(Box::new(FnTask::new("stash", |_: &(), facts: &mut Facts| {
//!         facts.insert("text", "hello");
//!         Ok(())
//!     })));
//! let outcome = manager.start(workflow, &()).unwrap();
//! assert!(outcome.is_pending());
//! manager.approve(outcome.id(), "admin", &()).unwrap();
//! assert_eq!(manager.pending_count(), 0);
//! ```

pub mod error;
pub mod facts;
pub mod manager;
pub mod task;
pub mod workflow;

pub use error::{Result, WorkflowError};
pub use facts::{keys, Facts};
pub use manager::{WorkflowManager, WorkflowOutcome, FINISHED_LIMIT};
pub use task::{FnTask, Task, TaskError, TaskRecord};
pub use workflow::{Workflow, WorkflowId, WorkflowState, WorkflowSummary};
