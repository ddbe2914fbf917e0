//! Workflow executor: walks an ordered list of tool steps under a shared
//! token and time budget.
//!
//! ```text
//! Pending ─▶ per step { Skipped
//!                     | Running ─▶ Succeeded
//!                     | Running ─▶ Retrying … ─▶ FallbackRunning ─▶ Succeeded
//!                     | Running ─▶ Retrying … ─▶ Failed }
//!         ─▶ WorkflowSucceeded | WorkflowFailed(timeout | budget | step)
//! ```
//!
//! Branching is decided by [`Condition`]s evaluated in host code; there is
//! no parallel fan-out and no step reordering.

pub mod context;
pub mod executor;
pub mod model;
pub mod result;

pub use context::AgentContext;
pub use executor::{ExecutorSettings, WorkflowExecutor};
pub use model::{
    Condition, ErrorMatcher, ErrorPredicate, FallbackConfig, Predicate, WorkflowConfig,
    WorkflowStep,
};
pub use result::{FailureReason, StepFailure, StepReport, StepState, WorkflowResult, WorkflowStatus};
