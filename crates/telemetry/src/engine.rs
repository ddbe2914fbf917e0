//! Thread-safe telemetry engine: turns workflow reports into span trees
//! and keeps running usage totals.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use toolflow_workflow::StepState;
use tracing::debug;

use crate::model::{Span, SpanKind, Trace, UsageSnapshot};
use crate::{TelemetryError, TelemetrySink, WorkflowReport};

/// Oldest traces are dropped past this many.
const DEFAULT_MAX_TRACES: usize = 5_000;

/// In-memory collector of workflow traces.
pub struct TelemetryEngine {
    /// All recorded traces (most recent last).
    traces: RwLock<Vec<Trace>>,
    totals: RwLock<UsageSnapshot>,
    max_traces: usize,
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryEngine {
    pub fn new() -> Self {
        Self::with_max_traces(DEFAULT_MAX_TRACES)
    }

    pub fn with_max_traces(max_traces: usize) -> Self {
        Self {
            traces: RwLock::new(Vec::new()),
            totals: RwLock::new(UsageSnapshot::default()),
            max_traces: max_traces.max(1),
        }
    }

    /// Fold a report into a new trace and the running totals.
    ///
    /// Returns the trace id.
    pub fn ingest(&self, report: &WorkflowReport) -> String {
        let trace = build_trace(report);
        let id = trace.id.clone();

        {
            let mut totals = self.totals.write();
            totals.workflows += 1;
            if report.result.success {
                totals.succeeded += 1;
            } else {
                totals.failed += 1;
            }
            totals.tool_executions += report.executions.len() as u64;
            totals.failed_executions +=
                report.executions.iter().filter(|e| !e.success).count() as u64;
            totals.tokens += report.executions.iter().map(|e| e.tokens as u64).sum::<u64>();
            totals.total_latency_ms += report.result.total_latency_ms;
        }

        let mut traces = self.traces.write();
        if traces.len() >= self.max_traces {
            let excess = traces.len() + 1 - self.max_traces;
            traces.drain(..excess);
        }
        debug!(trace_id = %id, workflow_id = %trace.workflow_id, spans = trace.spans.len(), "Recorded trace");
        traces.push(trace);
        id
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        self.traces.read().iter().find(|t| t.id == trace_id).cloned()
    }

    /// Most recent first.
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        self.traces.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn traces_for_workflow(&self, workflow_id: &str) -> Vec<Trace> {
        self.traces
            .read()
            .iter()
            .filter(|t| t.workflow_id == workflow_id)
            .cloned()
            .collect()
    }

    pub fn trace_count(&self) -> usize {
        self.traces.read().len()
    }

    pub fn usage_snapshot(&self) -> UsageSnapshot {
        let mut snapshot = self.totals.read().clone();
        snapshot.trace_count = self.traces.read().len() as u64;
        snapshot
    }

    /// Drop traces started before `cutoff`. Totals are kept.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut traces = self.traces.write();
        let before = traces.len();
        traces.retain(|t| t.started_at >= cutoff);
        before - traces.len()
    }

    /// One trace as pretty JSON.
    pub fn export_trace(&self, trace_id: &str) -> Result<String, TelemetryError> {
        let trace = self
            .get_trace(trace_id)
            .ok_or_else(|| TelemetryError::UnknownTrace(trace_id.to_string()))?;
        Ok(serde_json::to_string_pretty(&trace)?)
    }
}

impl TelemetrySink for TelemetryEngine {
    fn record(&self, report: &WorkflowReport) {
        self.ingest(report);
    }
}

/// Root span for the workflow, one child per non-skipped step, and one
/// grandchild per tool attempt of that step.
fn build_trace(report: &WorkflowReport) -> Trace {
    let result = &report.result;
    let started_at = report
        .executions
        .iter()
        .map(|e| e.started_at)
        .min()
        .unwrap_or_else(Utc::now);

    let mut trace = Trace::new(&result.workflow_id, started_at);
    trace.success = result.success;
    trace.steps_executed = result.steps_executed;

    let root = Span::new(SpanKind::Workflow, &result.workflow_id, started_at).finish(
        result.total_latency_ms,
        result.tokens_used,
        result.error.clone(),
    );
    let root_id = root.id.clone();
    trace.add_span(root);

    let mut step_spans: HashMap<&str, String> = HashMap::new();
    for step in result.steps.iter().filter(|s| s.state != StepState::Skipped) {
        let step_start = report
            .executions
            .iter()
            .filter(|e| e.step_id.as_deref() == Some(step.step_id.as_str()))
            .map(|e| e.started_at)
            .min()
            .unwrap_or(started_at);
        let span = Span::new(SpanKind::Step, &step.step_id, step_start)
            .with_parent(&root_id)
            .finish(step.latency_ms, step.tokens, step.error.clone());
        step_spans.insert(step.step_id.as_str(), span.id.clone());
        trace.add_span(span);
    }

    for execution in &report.executions {
        let parent = execution
            .step_id
            .as_deref()
            .and_then(|id| step_spans.get(id))
            .unwrap_or(&root_id);
        let span = Span::new(SpanKind::ToolExecution, &execution.tool_name, execution.started_at)
            .with_parent(parent)
            .finish(execution.latency_ms, execution.tokens, execution.error.clone());
        trace.add_span(span);
    }

    trace
}
