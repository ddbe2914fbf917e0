//! Data model for workflow traces, spans and usage totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Span ──────────────────────────────────────────────────────────────────

/// The kind of work a span represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// A whole workflow run (root span).
    Workflow,
    /// One workflow step, including its retries and fallback.
    Step,
    /// A single tool attempt.
    ToolExecution,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Workflow => write!(f, "workflow"),
            Self::Step => write!(f, "step"),
            Self::ToolExecution => write!(f, "tool_execution"),
        }
    }
}

/// A single traced unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    /// None for the root span.
    pub parent_id: Option<String>,
    pub kind: SpanKind,
    /// Workflow id, step id or tool name.
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Estimated output tokens.
    pub tokens: usize,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Span {
    pub fn new(kind: SpanKind, label: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            kind,
            label: label.into(),
            started_at,
            duration_ms: 0,
            tokens: 0,
            success: true,
            error: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Close the span with its measured outcome.
    pub fn finish(mut self, duration_ms: u64, tokens: usize, error: Option<String>) -> Self {
        self.duration_ms = duration_ms;
        self.tokens = tokens;
        self.success = error.is_none();
        self.error = error;
        self
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// The span tree of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub workflow_id: String,
    pub spans: Vec<Span>,
    pub started_at: DateTime<Utc>,
    pub success: bool,
    pub steps_executed: usize,
}

impl Trace {
    pub fn new(workflow_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            spans: Vec::new(),
            started_at,
            success: true,
            steps_executed: 0,
        }
    }

    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    pub fn root(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.parent_id.is_none())
    }

    /// Direct children of `span_id`.
    pub fn children<'a>(&'a self, span_id: &'a str) -> impl Iterator<Item = &'a Span> + 'a {
        self.spans
            .iter()
            .filter(move |s| s.parent_id.as_deref() == Some(span_id))
    }

    /// Tokens across all tool spans.
    pub fn total_tokens(&self) -> usize {
        self.tool_spans().map(|s| s.tokens).sum()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.root().map(|s| s.duration_ms).unwrap_or(0)
    }

    pub fn tool_execution_count(&self) -> usize {
        self.tool_spans().count()
    }

    pub fn failed_tool_executions(&self) -> usize {
        self.tool_spans().filter(|s| !s.success).count()
    }

    fn tool_spans(&self) -> impl Iterator<Item = &Span> {
        self.spans
            .iter()
            .filter(|s| s.kind == SpanKind::ToolExecution)
    }
}

// ── Aggregated views ──────────────────────────────────────────────────────

/// Point-in-time totals across every report ingested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub workflows: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub tool_executions: u64,
    pub failed_executions: u64,
    pub tokens: u64,
    pub total_latency_ms: u64,
    /// Traces currently held (after pruning).
    pub trace_count: u64,
}
