//! The agent engine.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use toolflow_config::AppConfig;
use toolflow_context::{ContextPolicy, ContextWindow};
use toolflow_core::execution::ToolExecution;
use toolflow_core::role::Role;
use toolflow_core::sanitize::{NoopSanitizer, Sanitizer};
use toolflow_telemetry::{TelemetrySink, TracingSink, WorkflowReport};
use toolflow_tools::ToolRegistry;
use toolflow_workflow::{AgentContext, ExecutorSettings, WorkflowConfig, WorkflowExecutor, WorkflowResult};
use tracing::{debug, info};

use crate::preamble::build_preamble;

/// Wires a registry, a context window, an executor and telemetry sinks
/// into one session.
pub struct AgentEngine {
    name: String,
    registry: Arc<ToolRegistry>,
    window: Arc<ContextWindow>,
    executor: WorkflowExecutor,
    sanitizer: Arc<dyn Sanitizer>,
    sinks: Vec<Arc<dyn TelemetrySink>>,
    telemetry_enabled: bool,
}

impl AgentEngine {
    /// Create an engine and open its session.
    ///
    /// The context window is sized from the token budget and seeded with a
    /// system preamble listing the enabled tools.
    pub fn new(config: &AppConfig, registry: Arc<ToolRegistry>) -> Self {
        let window = ContextWindow::new(config.budget.token_budget).with_policy(ContextPolicy {
            stale_after: config.context.stale_after(),
            compress_min_entries: config.context.compress_min_entries,
            summary_chars: config.context.summary_chars,
        });

        let tools = registry.list_tools();
        window.append(Role::System, build_preamble(&config.agent, &tools));

        let mut sinks: Vec<Arc<dyn TelemetrySink>> = Vec::new();
        if config.telemetry.enabled && config.telemetry.log_summaries {
            sinks.push(Arc::new(TracingSink::new(true)));
        }

        info!(
            agent = %config.agent.name,
            tools = tools.len(),
            budget = config.budget.token_budget,
            "Agent session started"
        );

        Self {
            name: config.agent.name.clone(),
            executor: WorkflowExecutor::new(registry.clone(), ExecutorSettings::from_config(config)),
            registry,
            window: Arc::new(window),
            sanitizer: Arc::new(NoopSanitizer),
            sinks,
            telemetry_enabled: config.telemetry.enabled,
        }
    }

    /// Sanitize step params before dispatch and reports before telemetry.
    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.executor = self.executor.with_sanitizer(sanitizer.clone());
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// The session's shared context window.
    pub fn context(&self) -> &Arc<ContextWindow> {
        &self.window
    }

    /// Every attempt recorded this session.
    pub fn history(&self) -> Vec<ToolExecution> {
        self.window.executions()
    }

    /// Execute `workflow` with caller variables, then report it.
    pub async fn run(&self, workflow: &WorkflowConfig, vars: HashMap<String, Value>) -> WorkflowResult {
        let mut ctx = AgentContext::new(self.window.clone()).with_vars(vars);

        let result = self.executor.execute(workflow, &mut ctx).await;

        let compressed = self.window.compress();
        if compressed > 0 {
            debug!(compressed, "Compressed context after run");
        }

        if self.telemetry_enabled && !self.sinks.is_empty() {
            let executions = ctx
                .executions()
                .iter()
                .cloned()
                .map(|e| self.sanitize_execution(e))
                .collect();
            let report = WorkflowReport {
                result: result.clone(),
                executions,
            };
            for sink in &self.sinks {
                sink.record(&report);
            }
        }

        result
    }

    /// End the session: drop everything but the system preamble.
    pub fn teardown(&self) {
        self.window.clear();
        info!(agent = %self.name, "Agent session cleared");
    }

    fn sanitize_execution(&self, mut execution: ToolExecution) -> ToolExecution {
        execution.params = self.sanitizer.sanitize(&execution.params);
        execution.result = execution.result.map(|r| self.sanitizer.sanitize(&r));
        execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use toolflow_core::error::ToolError;
    use toolflow_core::tool::{ToolManifest, tool_fn};
    use toolflow_security::KeyRedactor;
    use toolflow_workflow::WorkflowStep;

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<WorkflowReport>>,
    }

    impl TelemetrySink for RecordingSink {
        fn record(&self, report: &WorkflowReport) {
            self.reports.lock().unwrap().push(report.clone());
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry
            .register_tool(
                ToolManifest::new("lookup", "Look up an account"),
                tool_fn(|params| async move { Ok(json!({"account": params["id"], "token": "t-1"})) }),
            )
            .unwrap();
        registry
            .register_tool(
                ToolManifest::new("broken", "Always fails"),
                tool_fn(|_| async { Err(ToolError::invocation("broken", "nope")) }),
            )
            .unwrap();
        registry
            .register(ToolManifest::new("retired", "Old tool").disabled())
            .unwrap();
        Arc::new(registry)
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.agent.name = "scout".into();
        config.telemetry.log_summaries = false;
        config
    }

    #[tokio::test]
    async fn preamble_lists_enabled_tools_without_loading() {
        let registry = registry();
        let engine = AgentEngine::new(&config(), registry.clone());

        let entries = engine.context().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].role, Role::System);
        assert!(entries[0].content.contains("scout"));
        assert!(entries[0].content.contains("lookup"));
        assert!(!entries[0].content.contains("retired"));
        assert_eq!(registry.loaded_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_reports_sanitized_executions() {
        let sink = Arc::new(RecordingSink::default());
        let engine = AgentEngine::new(&config(), registry())
            .with_sanitizer(Arc::new(KeyRedactor::default()))
            .with_sink(sink.clone());
        let wf = WorkflowConfig::new("w").step(
            WorkflowStep::new("find", "lookup").with_params(json!({"id": 7, "api_key": "sk-live"})),
        );

        let result = engine.run(&wf, HashMap::new()).await;
        assert!(result.success);

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        let execution = &reports[0].executions[0];
        assert_eq!(execution.params["api_key"], "[REDACTED]");
        assert_eq!(execution.params["id"], 7);
        assert_eq!(execution.result.as_ref().unwrap()["token"], "[REDACTED]");
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_report_carries_only_its_own_executions() {
        let sink = Arc::new(RecordingSink::default());
        let engine = AgentEngine::new(&config(), registry()).with_sink(sink.clone());
        let ok = WorkflowConfig::new("ok").step(WorkflowStep::new("a", "lookup"));
        let bad = WorkflowConfig::new("bad").step(WorkflowStep::new("b", "broken").with_retries(1));

        engine.run(&ok, HashMap::new()).await;
        let result = engine.run(&bad, HashMap::new()).await;

        assert!(!result.success);
        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports[0].executions.len(), 1);
        assert_eq!(reports[1].executions.len(), 2);
        assert_eq!(engine.history().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_runs_report_only_their_own_executions() {
        let registry = registry();
        registry
            .register_tool(
                ToolManifest::new("slow", "Takes a while"),
                tool_fn(|_| async {
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    Ok(json!({"done": true}))
                }),
            )
            .unwrap();
        let sink = Arc::new(RecordingSink::default());
        let engine = AgentEngine::new(&config(), registry).with_sink(sink.clone());
        let one = WorkflowConfig::new("one").step(WorkflowStep::new("a", "slow"));
        let two = WorkflowConfig::new("two").step(WorkflowStep::new("b", "lookup"));

        tokio::join!(engine.run(&one, HashMap::new()), engine.run(&two, HashMap::new()));

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 2);
        for report in reports.iter() {
            let expected = if report.result.workflow_id == "one" { "a" } else { "b" };
            let steps: Vec<_> = report.executions.iter().map(|e| e.step_id.as_deref()).collect();
            assert_eq!(steps, vec![Some(expected)]);
        }
        assert_eq!(engine.history().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn vars_drive_conditions() {
        let engine = AgentEngine::new(&config(), registry());
        let wf = WorkflowConfig::new("w").step(WorkflowStep::new("a", "lookup").when(
            toolflow_workflow::Condition::VarTruthy { var: "enabled".into() },
        ));

        let skipped = engine.run(&wf, HashMap::new()).await;
        assert_eq!(skipped.steps_executed, 0);

        let vars = HashMap::from([("enabled".to_string(), json!(true))]);
        let ran = engine.run(&wf, vars).await;
        assert_eq!(ran.steps_executed, 1);
    }

    #[tokio::test]
    async fn disabled_telemetry_skips_sinks() {
        let sink = Arc::new(RecordingSink::default());
        let mut config = config();
        config.telemetry.enabled = false;
        let engine = AgentEngine::new(&config, registry()).with_sink(sink.clone());

        engine
            .run(&WorkflowConfig::new("w").step(WorkflowStep::new("a", "lookup")), HashMap::new())
            .await;

        assert!(sink.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn teardown_keeps_preamble() {
        let engine = AgentEngine::new(&config(), registry());
        engine
            .run(&WorkflowConfig::new("w").step(WorkflowStep::new("a", "lookup")), HashMap::new())
            .await;
        assert_eq!(engine.context().len(), 2);

        engine.teardown();

        let entries = engine.context().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].role, Role::System);
        assert!(engine.history().is_empty());
    }
}
