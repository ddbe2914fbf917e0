//! Log-stream sink.

use tracing::{debug, info, warn};

use crate::{TelemetrySink, WorkflowReport};

/// Writes one structured line per workflow, plus one debug line per
/// tool attempt when `log_executions` is set.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    log_executions: bool,
}

impl TracingSink {
    pub fn new(log_executions: bool) -> Self {
        Self { log_executions }
    }
}

impl TelemetrySink for TracingSink {
    fn record(&self, report: &WorkflowReport) {
        let result = &report.result;
        if result.success {
            info!(
                workflow_id = %result.workflow_id,
                steps_executed = result.steps_executed,
                executions = report.executions.len(),
                latency_ms = result.total_latency_ms,
                tokens = result.tokens_used,
                "Workflow report"
            );
        } else {
            warn!(
                workflow_id = %result.workflow_id,
                steps_executed = result.steps_executed,
                executions = report.executions.len(),
                latency_ms = result.total_latency_ms,
                error = result.error.as_deref().unwrap_or(""),
                "Workflow report"
            );
        }

        if self.log_executions {
            for execution in &report.executions {
                debug!(
                    workflow_id = %result.workflow_id,
                    step_id = execution.step_id.as_deref().unwrap_or(""),
                    summary = %execution.summary(),
                    "Tool execution"
                );
            }
        }
    }
}
