//! Error types for the toolflow domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Tool-level failures and workflow-level aborts are kept apart because
//! the executor treats them differently: the former are retried or
//! recovered, the latter always end the run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all toolflow operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Workflow errors ---
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    // --- Registry errors ---
    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    // --- Workflow definitions ---
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- I/O ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures attributable to a single tool: resolving it or running it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool disabled: {0}")]
    Disabled(String),

    #[error("Tool failed to load: {tool_name}: {reason}")]
    Load { tool_name: String, reason: String },

    #[error("Tool invocation failed: {tool_name}: {reason}")]
    Invocation { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Discriminant of [`ToolError`], used by fallback error matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    NotFound,
    Disabled,
    Load,
    Invocation,
    Timeout,
    InvalidArguments,
}

impl ToolError {
    pub fn invocation(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invocation {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }

    pub fn load(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Load {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ToolErrorKind {
        match self {
            Self::NotFound(_) => ToolErrorKind::NotFound,
            Self::Disabled(_) => ToolErrorKind::Disabled,
            Self::Load { .. } => ToolErrorKind::Load,
            Self::Invocation { .. } => ToolErrorKind::Invocation,
            Self::Timeout { .. } => ToolErrorKind::Timeout,
            Self::InvalidArguments(_) => ToolErrorKind::InvalidArguments,
        }
    }

    /// Whether another attempt of the same tool could plausibly succeed.
    ///
    /// Resolution failures (not found, disabled, load) and bad arguments
    /// are surfaced immediately; only run-time faults are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Invocation { .. } | Self::Timeout { .. })
    }
}

/// Conditions that end a workflow run early.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Workflow timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("Token budget exhausted: {remaining} tokens remaining, {reserve} required")]
    BudgetExhausted { remaining: usize, reserve: usize },

    #[error("Step '{step_id}' failed: {source}")]
    StepFailed {
        step_id: String,
        #[source]
        source: ToolError,
    },
}
