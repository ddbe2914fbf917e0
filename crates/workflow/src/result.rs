//! The terminal artifact of one `execute()` call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use toolflow_core::error::{ToolErrorKind, WorkflowError};

/// Why a workflow stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    Budget,
    StepFailure,
}

impl From<&WorkflowError> for FailureReason {
    fn from(err: &WorkflowError) -> Self {
        match err {
            WorkflowError::Timeout { .. } => Self::Timeout,
            WorkflowError::BudgetExhausted { .. } => Self::Budget,
            WorkflowError::StepFailed { .. } => Self::StepFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowStatus {
    Succeeded,
    Failed { reason: FailureReason },
}

/// Final state of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Condition evaluated false.
    Skipped,
    Succeeded,
    /// Primary failed, fallback succeeded.
    Recovered,
    Failed,
}

impl StepState {
    /// Whether the step produced a result.
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Succeeded | Self::Recovered)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step_id: String,
    pub tool: String,
    pub state: StepState,
    /// Primary attempts made, not counting the fallback.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_tool: Option<String>,
    pub latency_ms: u64,
    pub tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A primary tool that gave up, whether or not a fallback rescued it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailure {
    pub step_id: String,
    pub tool: String,
    pub kind: ToolErrorKind,
    pub message: String,
    pub recovered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub success: bool,
    pub status: WorkflowStatus,
    /// Steps that produced a result, including fallback rescues.
    pub steps_executed: usize,
    pub total_latency_ms: u64,
    /// Estimated tokens of every successful output.
    pub tokens_used: usize,
    pub results: BTreeMap<String, Value>,
    pub steps: Vec<StepReport>,
    pub failures: Vec<StepFailure>,
    pub insights: Vec<String>,
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self.status {
            WorkflowStatus::Succeeded => None,
            WorkflowStatus::Failed { reason } => Some(reason),
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Multi-line human summary for terminals and logs.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Workflow '{}' {} ({} steps, {}ms, ~{} tokens)\n",
            self.workflow_id,
            if self.success { "succeeded" } else { "failed" },
            self.steps_executed,
            self.total_latency_ms,
            self.tokens_used,
        );
        for insight in &self.insights {
            out.push_str(&format!("  - {insight}\n"));
        }
        if let Some(error) = &self.error {
            out.push_str(&format!("Error: {error}\n"));
        }
        if !self.suggestions.is_empty() {
            out.push_str("Next:\n");
            for s in &self.suggestions {
                out.push_str(&format!("  * {s}\n"));
            }
        }
        out
    }
}

/// Generic follow-ups, driven only by whether and how the run failed.
pub(crate) fn suggestions(reason: Option<FailureReason>, recovered: bool) -> Vec<String> {
    let mut out = Vec::new();
    match reason {
        None if recovered => {
            out.push("Check the primary tools that needed a fallback.".to_string());
        }
        None => {
            out.push("Review the step results and feed them to the next stage.".to_string());
        }
        Some(FailureReason::Timeout) => {
            out.push("Raise the workflow timeout or split the workflow.".to_string());
            out.push("Lower per-step timeouts for tools known to hang.".to_string());
        }
        Some(FailureReason::Budget) => {
            out.push("Compress or clear the context window before retrying.".to_string());
            out.push("Increase the token budget.".to_string());
        }
        Some(FailureReason::StepFailure) => {
            out.push("Inspect the failed step's error and tool health.".to_string());
            out.push("Add a fallback for the failing step.".to_string());
        }
    }
    out
}
