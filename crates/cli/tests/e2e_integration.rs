//! End-to-end integration tests for toolflow.
//!
//! These tests drive the full pipeline: discovery and lazy loading in the
//! registry, the agent engine, the workflow executor, the context window
//! and telemetry, with mock tools built from closures and call counters.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use toolflow_agent::AgentEngine;
use toolflow_config::AppConfig;
use toolflow_context::ContextWindow;
use toolflow_core::error::{ToolError, ToolErrorKind};
use toolflow_core::role::Role;
use toolflow_core::tool::{Tool, ToolManifest, tool_fn};
use toolflow_security::KeyRedactor;
use toolflow_telemetry::TelemetryEngine;
use toolflow_tools::{FnFactory, ToolRegistry, builtin_registry};
use toolflow_workflow::{
    AgentContext, ExecutorSettings, FailureReason, StepState, WorkflowConfig, WorkflowExecutor,
    WorkflowStep,
};

// ── Mock tools ───────────────────────────────────────────────────────────

/// A tool that fails its first `failures` calls, then echoes.
fn flaky(failures: usize, calls: Arc<AtomicUsize>) -> Arc<dyn Tool> {
    tool_fn(move |params| {
        let calls = calls.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                Err(ToolError::invocation("flaky", format!("transient failure #{}", n + 1)))
            } else {
                Ok(json!({"ok": true, "params": params}))
            }
        }
    })
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn quiet_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.telemetry.log_summaries = false;
    config
}

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

// ── Discovery → factory table → engine ───────────────────────────────────

#[tokio::test(start_paused = true)]
async fn discovered_manifests_resolve_through_factory_table() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write(
        dir.path(),
        "tools.json",
        r#"[
            {"name": "crm_lookup", "path": "connectors/crm", "version": "1.4.0",
             "description": "Find a customer by email", "category": "connector", "enabled": true},
            {"name": "legacy_export", "path": "native/export", "version": "0.2.0",
             "description": "Retired exporter", "category": "native", "enabled": false}
        ]"#,
    );

    let builds = counter();
    let registry = ToolRegistry::new();
    {
        let builds = builds.clone();
        registry.register_factory(
            "connectors/crm",
            Arc::new(FnFactory(move |manifest: &ToolManifest| {
                builds.fetch_add(1, Ordering::SeqCst);
                let version = manifest.version.clone();
                Ok::<_, ToolError>(tool_fn(move |params: Value| {
                    let version = version.clone();
                    async move {
                        Ok(json!({"customer": params["email"], "connector_version": version}))
                    }
                }))
            })),
        );
    }
    assert_eq!(registry.discover(&manifest).unwrap(), 2);
    assert_eq!(registry.loaded_count(), 0);
    let registry = Arc::new(registry);

    let telemetry = Arc::new(TelemetryEngine::new());
    let engine = AgentEngine::new(&quiet_config(), registry.clone())
        .with_sanitizer(Arc::new(KeyRedactor::default()))
        .with_sink(telemetry.clone());

    let preamble = &engine.context().entries()[0].content;
    assert!(preamble.contains("crm_lookup"));
    assert!(!preamble.contains("legacy_export"));
    assert_eq!(registry.loaded_count(), 0, "listing must not load tools");

    let wf = WorkflowConfig::new("enrich")
        .step(WorkflowStep::new("lookup", "crm_lookup").with_params(json!({"email": "a@b.c"})))
        .step(WorkflowStep::new("again", "crm_lookup").with_params(json!({"email": "d@e.f"})));
    let result = engine.run(&wf, HashMap::new()).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.results["lookup"]["connector_version"], "1.4.0");
    assert_eq!(builds.load(Ordering::SeqCst), 1, "implementation resolved once");
    assert!(registry.is_loaded("crm_lookup"));

    let usage = telemetry.usage_snapshot();
    assert_eq!(usage.workflows, 1);
    assert_eq!(usage.tool_executions, 2);

    // Disabled tools are known but refuse to load.
    let disabled = WorkflowConfig::new("old").step(WorkflowStep::new("x", "legacy_export"));
    let result = engine.run(&disabled, HashMap::new()).await;
    assert!(!result.success);
    assert_eq!(result.failures[0].kind, ToolErrorKind::Disabled);
}

// ── Round-trip scenario ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn ok_then_exhausted_step_reports_partial_result() {
    let registry = ToolRegistry::new();
    registry
        .register_tool(ToolManifest::new("a", "always fine"), flaky(0, counter()))
        .unwrap();
    let b_calls = counter();
    registry
        .register_tool(ToolManifest::new("b", "always broken"), flaky(usize::MAX, b_calls.clone()))
        .unwrap();

    let engine = AgentEngine::new(&quiet_config(), Arc::new(registry));
    let wf = WorkflowConfig::new("round_trip")
        .step(WorkflowStep::new("A", "a"))
        .step(WorkflowStep::new("B", "b").with_retries(2));

    let result = engine.run(&wf, HashMap::new()).await;

    assert!(!result.success);
    assert_eq!(result.steps_executed, 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 3);
    assert!(result.error.as_deref().unwrap().contains("'B'"));
    assert_eq!(result.failure_reason(), Some(FailureReason::StepFailure));
    assert!(!result.suggestions.is_empty());
    assert!(result.results.contains_key("A"));
}

// ── Retry, then recover ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let registry = ToolRegistry::new();
    let calls = counter();
    registry
        .register_tool(ToolManifest::new("flaky", "fails twice"), flaky(2, calls.clone()))
        .unwrap();
    let engine = AgentEngine::new(&quiet_config(), Arc::new(registry));

    let wf = WorkflowConfig::new("w").step(WorkflowStep::new("s", "flaky").with_retries(3));
    let result = engine.run(&wf, HashMap::new()).await;

    assert!(result.success);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.step("s").unwrap().attempts, 3);

    let history = engine.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history.iter().filter(|e| e.success).count(), 1);

    // Failed attempts were recorded at negative priority.
    let negatives = engine
        .context()
        .entries()
        .iter()
        .filter(|e| e.priority < 0)
        .count();
    assert_eq!(negatives, 2);
}

// ── Definition file with fallback and conditions ─────────────────────────

#[tokio::test(start_paused = true)]
async fn toml_workflow_with_fallback_and_conditions() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "notify.toml",
        r#"
        id = "notify_customer"
        timeout_ms = 10000

        [[steps]]
        id = "profile"
        tool = "echo"
        params = { name = "Ada", password = "hunter2" }

        [[steps]]
        id = "slack"
        tool = "slack_post"
        retries = 1
        condition = { type = "step_succeeded", step = "profile" }

        [[steps]]
        id = "vip_gift"
        tool = "echo"
        params = { gift = "mug" }
        condition = { type = "var_equals", var = "tier", value = "gold" }

        [[fallbacks]]
        step_id = "slack"
        tool = "echo"
        params = { channel = "email" }
        on_error = { type = "message_contains", text = "rate limited" }
        "#,
    );
    let wf = WorkflowConfig::load(&path).unwrap();

    let registry = builtin_registry();
    let slack_calls = counter();
    {
        let slack_calls = slack_calls.clone();
        registry
            .register_tool(
                ToolManifest::new("slack_post", "Post to Slack"),
                tool_fn(move |_| {
                    let slack_calls = slack_calls.clone();
                    async move {
                        slack_calls.fetch_add(1, Ordering::SeqCst);
                        Err(ToolError::invocation("slack_post", "Rate Limited (429)"))
                    }
                }),
            )
            .unwrap();
    }

    let engine = AgentEngine::new(&quiet_config(), registry)
        .with_sanitizer(Arc::new(KeyRedactor::default()));
    let vars = HashMap::from([("tier".to_string(), json!("silver"))]);
    let result = engine.run(&wf, vars).await;

    assert!(result.success);
    assert_eq!(slack_calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.step("slack").unwrap().state, StepState::Recovered);
    assert_eq!(result.step("vip_gift").unwrap().state, StepState::Skipped);
    assert_eq!(result.results["slack"], json!({"channel": "email"}));
    assert_eq!(result.results["profile"]["password"], "[REDACTED]");
    assert_eq!(result.steps_executed, 2);
}

// ── Timeouts ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn workflow_deadline_aborts_with_partial_results() {
    let engine = AgentEngine::new(&quiet_config(), builtin_registry());
    let mut wf = WorkflowConfig::new("slow");
    for i in 1..=5 {
        wf = wf.step(WorkflowStep::new(format!("nap{i}"), "delay").with_params(json!({"ms": 800})));
    }

    // Default workflow timeout is 1500ms.
    let result = engine.run(&wf, HashMap::new()).await;

    assert!(!result.success);
    assert_eq!(result.failure_reason(), Some(FailureReason::Timeout));
    assert_eq!(result.steps_executed, 2);
    assert_eq!(result.results["nap2"], json!({"slept_ms": 800}));
}

#[tokio::test(start_paused = true)]
async fn per_step_timeout_counts_as_failed_attempt() {
    let mut config = quiet_config();
    config.execution.step_timeout_ms = 100;
    config.execution.workflow_timeout_ms = 60_000;
    let engine = AgentEngine::new(&config, builtin_registry());

    let wf = WorkflowConfig::new("w")
        .step(WorkflowStep::new("nap", "delay").with_params(json!({"ms": 5000})).with_retries(1));
    let result = engine.run(&wf, HashMap::new()).await;

    assert!(!result.success);
    assert_eq!(result.failures[0].kind, ToolErrorKind::Timeout);
    assert_eq!(result.step("nap").unwrap().attempts, 2);
    assert_eq!(engine.history().len(), 2);
}

// ── Budget gate ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn budget_gate_blocks_before_tool_is_called() {
    let registry = ToolRegistry::new();
    let calls = counter();
    registry
        .register_tool(ToolManifest::new("a", "counted"), flaky(0, calls.clone()))
        .unwrap();
    let window = Arc::new(ContextWindow::new(2000));
    window.append(Role::User, "x".repeat((2000 - 50) * 4));
    let mut ctx = AgentContext::new(window.clone());

    let executor = WorkflowExecutor::new(Arc::new(registry), ExecutorSettings::default());
    let result = executor
        .execute(&WorkflowConfig::new("w").step(WorkflowStep::new("s", "a")), &mut ctx)
        .await;

    assert!(!result.success);
    assert_eq!(result.failure_reason(), Some(FailureReason::Budget));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(window.execution_count(), 0);
}

// ── Shared registry, concurrent sessions ─────────────────────────────────

#[tokio::test(start_paused = true)]
async fn concurrent_engines_share_one_materialization() {
    let builds = counter();
    let registry = ToolRegistry::new();
    registry
        .register(ToolManifest::new("shared", "Shared tool").with_path("native/shared"))
        .unwrap();
    {
        let builds = builds.clone();
        registry.register_factory(
            "native/shared",
            Arc::new(FnFactory(move |_: &ToolManifest| {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ToolError>(tool_fn(|params| async move {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    Ok(params)
                }))
            })),
        );
    }
    let registry = Arc::new(registry);

    let engines: Vec<AgentEngine> = (0..4)
        .map(|_| AgentEngine::new(&quiet_config(), registry.clone()))
        .collect();
    let wf = WorkflowConfig::new("w").step(WorkflowStep::new("s", "shared"));

    let results = futures::future::join_all(engines.iter().map(|e| e.run(&wf, HashMap::new()))).await;

    assert!(results.iter().all(|r| r.success));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    for engine in &engines {
        assert_eq!(engine.history().len(), 1, "each session has its own window");
    }
}

// ── Window invariants under a long session ───────────────────────────────

#[tokio::test(start_paused = true)]
async fn long_session_stays_within_budget() {
    let mut config = quiet_config();
    config.budget.token_budget = 400;
    config.execution.workflow_timeout_ms = 600_000;
    let engine = AgentEngine::new(&config, builtin_registry());

    let wf = WorkflowConfig::new("chatty")
        .step(WorkflowStep::new("big", "echo").with_params(json!({"blob": "z".repeat(20_000)})));

    for _ in 0..30 {
        let result = engine.run(&wf, HashMap::new()).await;
        let window = engine.context();
        let entries = window.entries();
        let total: usize = entries.iter().map(|e| e.tokens).sum();
        assert!(total <= window.capacity());
        assert_eq!(entries[0].role, Role::System);
        if !result.success {
            assert_eq!(result.failure_reason(), Some(FailureReason::Budget));
        }
    }

    // Output tokens are tracked even though payloads never enter the window.
    assert!(engine.context().tokens_consumed() >= 5_000);
}
