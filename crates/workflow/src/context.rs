//! The live state a workflow runs against.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use toolflow_context::ContextWindow;
use toolflow_core::execution::ToolExecution;

/// Variables supplied by the caller, results of completed steps, and the
/// shared context window that execution summaries are recorded into.
#[derive(Clone)]
pub struct AgentContext {
    vars: HashMap<String, Value>,
    results: BTreeMap<String, Value>,
    window: Arc<ContextWindow>,
    executions: Vec<ToolExecution>,
}

impl AgentContext {
    pub fn new(window: Arc<ContextWindow>) -> Self {
        Self {
            vars: HashMap::new(),
            results: BTreeMap::new(),
            window,
            executions: Vec::new(),
        }
    }

    pub fn with_vars(mut self, vars: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.vars.extend(vars);
        self
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn vars(&self) -> &HashMap<String, Value> {
        &self.vars
    }

    /// Result of a step that completed, directly or through its fallback.
    pub fn step_result(&self, step_id: &str) -> Option<&Value> {
        self.results.get(step_id)
    }

    pub fn set_step_result(&mut self, step_id: impl Into<String>, result: Value) {
        self.results.insert(step_id.into(), result);
    }

    pub fn step_results(&self) -> &BTreeMap<String, Value> {
        &self.results
    }

    pub fn window(&self) -> &Arc<ContextWindow> {
        &self.window
    }

    /// Every attempt recorded into the window so far, by any workflow
    /// sharing it.
    pub fn history(&self) -> Vec<ToolExecution> {
        self.window.executions()
    }

    /// Attempts made through this context only.
    pub fn executions(&self) -> &[ToolExecution] {
        &self.executions
    }

    /// Record an attempt here and in the shared window.
    pub fn record_execution(&mut self, execution: ToolExecution) {
        self.executions.push(execution.clone());
        self.window.record_tool_execution(execution);
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("vars", &self.vars)
            .field("results", &self.results.keys().collect::<Vec<_>>())
            .field("executions", &self.executions.len())
            .field("window_tokens", &self.window.current_tokens())
            .finish()
    }
}
