//! The orchestration state machine.
//!
//! Steps run once, in declaration order, one at a time. Before each step
//! the executor checks, in order: the step's condition, the workflow
//! deadline, and the remaining token budget. A step then gets its primary
//! tool with retries and backoff, and after that at most one fallback.
//! Whatever happens, `execute` returns a [`WorkflowResult`].

use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use toolflow_config::AppConfig;
use toolflow_core::error::{ToolError, WorkflowError};
use toolflow_core::execution::ToolExecution;
use toolflow_core::sanitize::{NoopSanitizer, Sanitizer};
use toolflow_tools::ToolRegistry;
use tracing::{debug, info, warn};

use crate::context::AgentContext;
use crate::model::{WorkflowConfig, WorkflowStep};
use crate::result::{
    FailureReason, StepFailure, StepReport, StepState, WorkflowResult, WorkflowStatus, suggestions,
};

/// Defaults applied when a workflow or step does not override them.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub step_timeout: Duration,
    pub workflow_timeout: Duration,
    /// Additional attempts after the first.
    pub retries: u32,
    /// Delay before retry `n` is `n * backoff_unit`.
    pub backoff_unit: Duration,
    /// Steps are not started with less budget than this.
    pub reserve_tokens: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_millis(5000),
            workflow_timeout: Duration::from_millis(1500),
            retries: 3,
            backoff_unit: Duration::from_millis(100),
            reserve_tokens: 100,
        }
    }
}

impl ExecutorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            step_timeout: config.execution.step_timeout(),
            workflow_timeout: config.execution.workflow_timeout(),
            retries: config.execution.retries,
            backoff_unit: config.execution.backoff_unit(),
            reserve_tokens: config.budget.reserve_tokens,
        }
    }
}

/// Outcome of one step, before it is folded into the workflow result.
struct StepRun {
    report: StepReport,
    result: Option<Value>,
    /// The error that exhausted the primary tool, if it did.
    primary_error: Option<ToolError>,
}

pub struct WorkflowExecutor {
    registry: Arc<ToolRegistry>,
    settings: ExecutorSettings,
    sanitizer: Arc<dyn Sanitizer>,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<ToolRegistry>, settings: ExecutorSettings) -> Self {
        Self {
            registry,
            settings,
            sanitizer: Arc::new(NoopSanitizer),
        }
    }

    /// Run every step's params through `sanitizer` before dispatch.
    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute `workflow` against `ctx`.
    ///
    /// Step results are written into `ctx` as they complete, and every
    /// attempt is recorded into its context window.
    pub async fn execute(&self, workflow: &WorkflowConfig, ctx: &mut AgentContext) -> WorkflowResult {
        let started = Instant::now();
        let deadline = workflow
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.settings.workflow_timeout);

        info!(
            workflow_id = %workflow.id,
            steps = workflow.steps.len(),
            deadline_ms = deadline.as_millis() as u64,
            "Starting workflow"
        );

        let mut reports = Vec::with_capacity(workflow.steps.len());
        let mut results = BTreeMap::new();
        let mut failures = Vec::new();
        let mut insights = Vec::new();
        let mut steps_executed = 0;
        let mut tokens_used = 0;
        let mut abort: Option<WorkflowError> = None;

        for step in &workflow.steps {
            if let Some(condition) = &step.condition {
                if !condition.evaluate(ctx) {
                    debug!(step_id = %step.id, "Condition not met, skipping step");
                    insights.push(format!("Step '{}' skipped: condition not met", step.id));
                    reports.push(StepReport {
                        step_id: step.id.clone(),
                        tool: step.tool.clone(),
                        state: StepState::Skipped,
                        attempts: 0,
                        fallback_tool: None,
                        latency_ms: 0,
                        tokens: 0,
                        error: None,
                    });
                    continue;
                }
            }

            let elapsed = started.elapsed();
            if elapsed > deadline {
                let err = WorkflowError::Timeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                    limit_ms: deadline.as_millis() as u64,
                };
                warn!(workflow_id = %workflow.id, step_id = %step.id, error = %err, "Aborting workflow");
                insights.push(format!("Aborted before step '{}': {err}", step.id));
                abort = Some(err);
                break;
            }

            let remaining = ctx.window().remaining_budget();
            if remaining < self.settings.reserve_tokens {
                let err = WorkflowError::BudgetExhausted {
                    remaining,
                    reserve: self.settings.reserve_tokens,
                };
                warn!(workflow_id = %workflow.id, step_id = %step.id, error = %err, "Aborting workflow");
                insights.push(format!("Aborted before step '{}': {err}", step.id));
                abort = Some(err);
                break;
            }

            let run = self.run_step(workflow, step, ctx).await;
            tokens_used += run.report.tokens;

            if let Some(err) = &run.primary_error {
                failures.push(StepFailure {
                    step_id: step.id.clone(),
                    tool: step.tool.clone(),
                    kind: err.kind(),
                    message: err.to_string(),
                    recovered: run.report.state == StepState::Recovered,
                });
            }

            match (run.report.state, run.result, run.primary_error) {
                (StepState::Succeeded, Some(value), _) => {
                    insights.push(format!(
                        "Step '{}' completed with '{}' in {}ms ({} attempt(s))",
                        step.id, step.tool, run.report.latency_ms, run.report.attempts
                    ));
                    steps_executed += 1;
                    ctx.set_step_result(step.id.clone(), value.clone());
                    results.insert(step.id.clone(), value);
                }
                (StepState::Recovered, Some(value), _) => {
                    insights.push(format!(
                        "Step '{}' recovered via fallback '{}' after '{}' failed",
                        step.id,
                        run.report.fallback_tool.as_deref().unwrap_or_default(),
                        step.tool
                    ));
                    steps_executed += 1;
                    ctx.set_step_result(step.id.clone(), value.clone());
                    results.insert(step.id.clone(), value);
                }
                (_, _, Some(source)) => {
                    insights.push(format!(
                        "Step '{}' failed after {} attempt(s): {source}",
                        step.id, run.report.attempts
                    ));
                    let err = WorkflowError::StepFailed {
                        step_id: step.id.clone(),
                        source,
                    };
                    warn!(workflow_id = %workflow.id, error = %err, "Aborting workflow");
                    abort = Some(err);
                    reports.push(run.report);
                    break;
                }
                (state, _, None) => {
                    // A completed step always carries a value; anything else
                    // carries its primary error.
                    debug!(step_id = %step.id, ?state, "Step finished without a result");
                }
            }
            reports.push(run.report);
        }

        let status = match &abort {
            None => WorkflowStatus::Succeeded,
            Some(err) => WorkflowStatus::Failed {
                reason: FailureReason::from(err),
            },
        };
        let reason = abort.as_ref().map(FailureReason::from);
        let recovered = failures.iter().any(|f| f.recovered);
        let total_latency_ms = started.elapsed().as_millis() as u64;

        insights.push(format!(
            "{steps_executed} of {} step(s) executed",
            workflow.steps.len()
        ));

        let result = WorkflowResult {
            workflow_id: workflow.id.clone(),
            success: abort.is_none(),
            status,
            steps_executed,
            total_latency_ms,
            tokens_used,
            results,
            steps: reports,
            failures,
            insights,
            suggestions: suggestions(reason, recovered),
            error: abort.map(|e| e.to_string()),
        };

        info!(
            workflow_id = %result.workflow_id,
            success = result.success,
            steps_executed = result.steps_executed,
            latency_ms = result.total_latency_ms,
            tokens = result.tokens_used,
            "Workflow finished"
        );
        result
    }

    /// Primary with retries, then at most one fallback.
    async fn run_step(
        &self,
        workflow: &WorkflowConfig,
        step: &WorkflowStep,
        ctx: &mut AgentContext,
    ) -> StepRun {
        let retries = step
            .retries
            .or(workflow.retries)
            .unwrap_or(self.settings.retries);
        let timeout = step
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.settings.step_timeout);
        let params = self.sanitizer.sanitize(&step.params);
        let clock = Instant::now();
        let mut attempts = 0u32;

        let primary_error = loop {
            attempts += 1;
            match self.attempt(&step.tool, &step.id, &params, timeout, ctx).await {
                Ok((value, tokens)) => {
                    return StepRun {
                        report: StepReport {
                            step_id: step.id.clone(),
                            tool: step.tool.clone(),
                            state: StepState::Succeeded,
                            attempts,
                            fallback_tool: None,
                            latency_ms: clock.elapsed().as_millis() as u64,
                            tokens,
                            error: None,
                        },
                        result: Some(value),
                        primary_error: None,
                    };
                }
                Err(err) => {
                    warn!(
                        step_id = %step.id,
                        tool = %step.tool,
                        attempt = attempts,
                        error = %err,
                        "Step attempt failed"
                    );
                    if !err.is_retryable() || attempts > retries {
                        break err;
                    }
                    let delay = self.settings.backoff_unit * attempts;
                    debug!(step_id = %step.id, delay_ms = delay.as_millis() as u64, "Backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        };

        let Some(fallback) = workflow
            .fallbacks
            .iter()
            .find(|f| f.accepts(&step.id, &primary_error))
        else {
            return StepRun {
                report: StepReport {
                    step_id: step.id.clone(),
                    tool: step.tool.clone(),
                    state: StepState::Failed,
                    attempts,
                    fallback_tool: None,
                    latency_ms: clock.elapsed().as_millis() as u64,
                    tokens: 0,
                    error: Some(primary_error.to_string()),
                },
                result: None,
                primary_error: Some(primary_error),
            };
        };

        info!(step_id = %step.id, tool = %step.tool, fallback = %fallback.tool, "Primary exhausted, running fallback");
        let params = self.sanitizer.sanitize(&fallback.params);
        let outcome = self
            .attempt(&fallback.tool, &step.id, &params, timeout, ctx)
            .await;

        let (state, result, tokens, error) = match outcome {
            Ok((value, tokens)) => (StepState::Recovered, Some(value), tokens, None),
            Err(fallback_error) => {
                warn!(step_id = %step.id, fallback = %fallback.tool, error = %fallback_error, "Fallback failed");
                (
                    StepState::Failed,
                    None,
                    0,
                    Some(format!("{primary_error}; fallback '{}': {fallback_error}", fallback.tool)),
                )
            }
        };

        StepRun {
            report: StepReport {
                step_id: step.id.clone(),
                tool: step.tool.clone(),
                state,
                attempts,
                fallback_tool: Some(fallback.tool.clone()),
                latency_ms: clock.elapsed().as_millis() as u64,
                tokens,
                error,
            },
            result,
            primary_error: Some(primary_error),
        }
    }

    /// Resolve and run one tool under `timeout`, recording the attempt.
    ///
    /// Loading counts against the same timer as the call. The record is
    /// written after the race resolves, so an abandoned call can never
    /// reach the window.
    async fn attempt(
        &self,
        tool_name: &str,
        step_id: &str,
        params: &Value,
        timeout: Duration,
        ctx: &mut AgentContext,
    ) -> Result<(Value, usize), ToolError> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let call = async {
            let tool = self.registry.load(tool_name).await?;
            tool.execute(params.clone()).await
        };
        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool_name: tool_name.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        let latency_ms = clock.elapsed().as_millis() as u64;
        let tokens = outcome
            .as_ref()
            .map(|v| ctx.window().estimator().estimate_json(v))
            .unwrap_or(0);

        ctx.record_execution(ToolExecution {
            tool_name: tool_name.to_string(),
            step_id: Some(step_id.to_string()),
            params: params.clone(),
            started_at,
            latency_ms,
            tokens,
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(ToString::to_string),
            result: outcome.as_ref().ok().cloned(),
        });

        outcome.map(|value| (value, tokens))
    }
}
