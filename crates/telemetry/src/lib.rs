//! Execution telemetry for toolflow.
//!
//! After every workflow the agent hands a [`WorkflowReport`] (the
//! `WorkflowResult` plus every recorded `ToolExecution`) to each
//! registered [`TelemetrySink`]. What a sink keeps, and for how long, is
//! its own business: [`TelemetryEngine`] folds reports into span trees and
//! running totals, [`TracingSink`] writes them to the log stream.

pub mod engine;
pub mod model;
pub mod sink;

use serde::{Deserialize, Serialize};
use toolflow_core::execution::ToolExecution;
use toolflow_workflow::WorkflowResult;

pub use engine::TelemetryEngine;
pub use model::{Span, SpanKind, Trace, UsageSnapshot};
pub use sink::TracingSink;

/// Everything one workflow run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub result: WorkflowResult,
    /// Attempts recorded during this run, params already sanitized.
    pub executions: Vec<ToolExecution>,
}

/// Receiver of completed workflow reports.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, report: &WorkflowReport);
}

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown trace id: {0}")]
    UnknownTrace(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
