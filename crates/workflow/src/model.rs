//! Workflow definitions: steps, fallbacks and the predicates that gate them.
//!
//! Everything here is plain data that deserializes from TOML or JSON.
//! Branching is expressed with [`Condition`] and evaluated by host code
//! against the live [`AgentContext`]; no model is ever consulted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use toolflow_core::error::{Error, Result, ToolError, ToolErrorKind};

use crate::context::AgentContext;

/// An ordered list of steps executed under one token and time budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub steps: Vec<WorkflowStep>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<FallbackConfig>,

    /// Overrides the executor's workflow deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Overrides the executor's default retry count for every step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

/// One unit of work bound to exactly one primary tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub tool: String,

    #[serde(default)]
    pub params: Value,

    /// When present and false, the step is skipped without a trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Alternate tool for a step, tried once after the primary gives up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub step_id: String,
    pub tool: String,

    #[serde(default)]
    pub params: Value,

    /// Which primary errors this fallback accepts. Absent means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<ErrorMatcher>,
}

impl FallbackConfig {
    pub fn new(step_id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            tool: tool.into(),
            params: Value::Null,
            on_error: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn on_error(mut self, matcher: ErrorMatcher) -> Self {
        self.on_error = Some(matcher);
        self
    }

    /// Whether this fallback applies to `error` raised by `step_id`.
    pub fn accepts(&self, step_id: &str, error: &ToolError) -> bool {
        self.step_id == step_id && self.on_error.as_ref().is_none_or(|m| m.matches(error))
    }
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            params: Value::Null,
            condition: None,
            retries: None,
            timeout_ms: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

impl WorkflowConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            steps: Vec::new(),
            fallbacks: Vec::new(),
            timeout_ms: None,
            retries: None,
        }
    }

    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn fallback(mut self, fallback: FallbackConfig) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let workflow: Self =
            toml::from_str(content).map_err(|e| Error::InvalidWorkflow(e.to_string()))?;
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let workflow: Self =
            serde_json::from_str(content).map_err(|e| Error::InvalidWorkflow(e.to_string()))?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Load a `.toml` or `.json` workflow definition.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            other => Err(Error::InvalidWorkflow(format!(
                "unsupported workflow format: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }

    /// Reject definitions the executor could not run meaningfully.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidWorkflow("workflow id is empty".into()));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(Error::InvalidWorkflow("step id is empty".into()));
            }
            if step.tool.trim().is_empty() {
                return Err(Error::InvalidWorkflow(format!(
                    "step '{}' has no tool",
                    step.id
                )));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(Error::InvalidWorkflow(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }

        for fallback in &self.fallbacks {
            if !seen.contains(fallback.step_id.as_str()) {
                return Err(Error::InvalidWorkflow(format!(
                    "fallback bound to unknown step '{}'",
                    fallback.step_id
                )));
            }
            if fallback.tool.trim().is_empty() {
                return Err(Error::InvalidWorkflow(format!(
                    "fallback for step '{}' has no tool",
                    fallback.step_id
                )));
            }
        }
        Ok(())
    }
}

// ── Predicates ────────────────────────────────────────────────────────────

/// Host-code predicate over the agent context.
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(&AgentContext) -> bool + Send + Sync>);

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(<fn>)")
    }
}

/// Host-code predicate over a tool error.
#[derive(Clone)]
pub struct ErrorPredicate(Arc<dyn Fn(&ToolError) -> bool + Send + Sync>);

impl fmt::Debug for ErrorPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorPredicate(<fn>)")
    }
}

/// Step gate.
///
/// ```toml
/// condition = { type = "var_equals", var = "tier", value = "gold" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    VarEquals { var: String, value: Value },
    VarExists { var: String },
    /// Present and not `null`, `false`, `0`, `""`, `[]` or `{}`.
    VarTruthy { var: String },
    StepSucceeded { step: String },
    Not { condition: Box<Condition> },
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
    /// Programmatic only; cannot appear in a definition file.
    #[serde(skip)]
    Custom(Predicate),
}

impl Condition {
    pub fn custom(f: impl Fn(&AgentContext) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Predicate(Arc::new(f)))
    }

    pub fn evaluate(&self, ctx: &AgentContext) -> bool {
        match self {
            Self::VarEquals { var, value } => ctx.var(var) == Some(value),
            Self::VarExists { var } => ctx.var(var).is_some(),
            Self::VarTruthy { var } => ctx.var(var).is_some_and(is_truthy),
            Self::StepSucceeded { step } => ctx.step_result(step).is_some(),
            Self::Not { condition } => !condition.evaluate(ctx),
            Self::All { conditions } => conditions.iter().all(|c| c.evaluate(ctx)),
            Self::Any { conditions } => conditions.iter().any(|c| c.evaluate(ctx)),
            Self::Custom(Predicate(f)) => f(ctx),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Fallback error filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorMatcher {
    Any,
    Kind { kinds: Vec<ToolErrorKind> },
    /// Case-insensitive substring of the error message.
    MessageContains { text: String },
    #[serde(skip)]
    Custom(ErrorPredicate),
}

impl ErrorMatcher {
    pub fn custom(f: impl Fn(&ToolError) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(ErrorPredicate(Arc::new(f)))
    }

    pub fn matches(&self, error: &ToolError) -> bool {
        match self {
            Self::Any => true,
            Self::Kind { kinds } => kinds.contains(&error.kind()),
            Self::MessageContains { text } => error
                .to_string()
                .to_lowercase()
                .contains(&text.to_lowercase()),
            Self::Custom(ErrorPredicate(f)) => f(error),
        }
    }
}
