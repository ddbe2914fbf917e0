//! The immutable record of one tool invocation attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest error text carried into a one-line summary.
const SUMMARY_ERROR_CHARS: usize = 120;

/// Longest tool name or step id carried into a one-line summary.
const SUMMARY_NAME_CHARS: usize = 48;

/// One invocation attempt, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    /// Name of the tool that ran.
    pub tool_name: String,

    /// Workflow step that triggered the attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,

    /// Parameters after sanitization.
    pub params: serde_json::Value,

    pub started_at: DateTime<Utc>,

    pub latency_ms: u64,

    /// Estimated tokens of the produced output.
    pub tokens: usize,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl ToolExecution {
    /// Compact one-line summary mirrored into the context window.
    ///
    /// Never includes the result payload.
    pub fn summary(&self) -> String {
        let tool = clip(&self.tool_name, SUMMARY_NAME_CHARS);
        let step = self
            .step_id
            .as_deref()
            .map(|s| format!(" [{}]", clip(s, SUMMARY_NAME_CHARS)))
            .unwrap_or_default();
        if self.success {
            format!(
                "{}{} ok in {}ms (~{} tokens)",
                tool, step, self.latency_ms, self.tokens
            )
        } else {
            let err = self.error.as_deref().unwrap_or("unknown error");
            format!(
                "{}{} failed after {}ms: {}",
                tool,
                step,
                self.latency_ms,
                clip(err, SUMMARY_ERROR_CHARS)
            )
        }
    }
}

/// First `max` chars of `text`, with `...` appended when cut.
fn clip(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
