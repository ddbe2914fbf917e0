//! `toolflow run`: execute a workflow definition.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use toolflow_agent::AgentEngine;
use toolflow_security::KeyRedactor;
use toolflow_telemetry::TelemetryEngine;
use toolflow_workflow::WorkflowConfig;

use super::{build_registry, load_config};

/// Parse `key=value`. The value is read as JSON when it parses, so
/// `--var count=3` is a number and `--var tier=gold` a string.
pub fn parse_var(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Returns whether the workflow succeeded.
pub async fn run(
    config_path: Option<&Path>,
    workflow_path: &Path,
    vars: Vec<(String, Value)>,
    json: bool,
    trace: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let workflow = WorkflowConfig::load(workflow_path)?;
    let registry = build_registry(&config)?;
    let telemetry = Arc::new(TelemetryEngine::new());

    let engine = AgentEngine::new(&config, registry)
        .with_sanitizer(Arc::new(KeyRedactor::default()))
        .with_sink(telemetry.clone());

    let vars: HashMap<String, Value> = vars.into_iter().collect();
    let result = engine.run(&workflow, vars).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.render());
    }

    if trace {
        if let Some(recorded) = telemetry.recent_traces(1).first() {
            println!("{}", telemetry.export_trace(&recorded.id)?);
        }
    }

    engine.teardown();
    Ok(result.success)
}
