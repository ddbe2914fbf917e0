//! Configuration loading, validation, and management for toolflow.
//!
//! Loads configuration from `~/.toolflow/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.toolflow/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Token budget of the context window
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Timeouts, retries and backoff
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Tool discovery
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Context window compression
    #[serde(default)]
    pub context: ContextConfig,

    /// Agent identity and preamble
    #[serde(default)]
    pub agent: AgentConfig,

    /// Execution summaries
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Capacity of the context window, in estimated tokens.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Minimum remaining budget required before running another step.
    #[serde(default = "default_reserve_tokens")]
    pub reserve_tokens: usize,
}

fn default_token_budget() -> usize {
    2000
}
fn default_reserve_tokens() -> usize {
    100
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            reserve_tokens: default_reserve_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    #[serde(default = "default_workflow_timeout_ms")]
    pub workflow_timeout_ms: u64,

    /// Additional attempts after the first one.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Delay before retry `n` is `n * backoff_unit_ms`.
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
}

fn default_step_timeout_ms() -> u64 {
    5000
}
fn default_workflow_timeout_ms() -> u64 {
    1500
}
fn default_retries() -> u32 {
    3
}
fn default_backoff_unit_ms() -> u64 {
    100
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout_ms(),
            workflow_timeout_ms: default_workflow_timeout_ms(),
            retries: default_retries(),
            backoff_unit_ms: default_backoff_unit_ms(),
        }
    }
}

impl ExecutionConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn workflow_timeout(&self) -> Duration {
        Duration::from_millis(self.workflow_timeout_ms)
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Manifest file, or a directory of tool descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_source: Option<String>,

    /// Manifest file name looked up inside a directory source.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Register the built-in `echo` and `delay` tools.
    #[serde(default = "default_true")]
    pub builtins: bool,
}

fn default_manifest_file() -> String {
    "tools.json".into()
}
fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            manifest_source: None,
            manifest_file: default_manifest_file(),
            builtins: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Entries older than this are eligible for compression.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Compression is skipped below this many entries.
    #[serde(default = "default_compress_min_entries")]
    pub compress_min_entries: usize,

    /// Longest summary kept for a compressed entry.
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,
}

fn default_stale_after_secs() -> u64 {
    300
}
fn default_compress_min_entries() -> usize {
    10
}
fn default_summary_chars() -> usize {
    120
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            compress_min_entries: default_compress_min_entries(),
            summary_chars: default_summary_chars(),
        }
    }
}

impl ContextConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Replaces the generated introduction. The tool list is still appended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_preamble: Option<String>,
}

fn default_agent_name() -> String {
    "toolflow".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_preamble: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether execution summaries are collected
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Also write one log line per finished workflow
    #[serde(default = "default_true")]
    pub log_summaries: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_summaries: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolflow/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file path.
    ///
    /// Environment overrides are applied after the file is read:
    /// - `TOOLFLOW_TOKEN_BUDGET`
    /// - `TOOLFLOW_STEP_TIMEOUT_MS`
    /// - `TOOLFLOW_WORKFLOW_TIMEOUT_MS`
    /// - `TOOLFLOW_RETRIES`
    /// - `TOOLFLOW_MANIFEST`
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            tracing::info!("No config file found at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TOOLFLOW_TOKEN_BUDGET") {
            self.budget.token_budget = parse_env("TOOLFLOW_TOKEN_BUDGET", &v)?;
        }
        if let Some(v) = lookup("TOOLFLOW_STEP_TIMEOUT_MS") {
            self.execution.step_timeout_ms = parse_env("TOOLFLOW_STEP_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TOOLFLOW_WORKFLOW_TIMEOUT_MS") {
            self.execution.workflow_timeout_ms = parse_env("TOOLFLOW_WORKFLOW_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TOOLFLOW_RETRIES") {
            self.execution.retries = parse_env("TOOLFLOW_RETRIES", &v)?;
        }
        if let Some(v) = lookup("TOOLFLOW_MANIFEST") {
            self.registry.manifest_source = Some(v);
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolflow")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "budget.token_budget must be > 0".into(),
            ));
        }

        if self.budget.reserve_tokens >= self.budget.token_budget {
            return Err(ConfigError::ValidationError(
                "budget.reserve_tokens must be smaller than budget.token_budget".into(),
            ));
        }

        if self.execution.step_timeout_ms == 0 || self.execution.workflow_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "execution timeouts must be > 0".into(),
            ));
        }

        if self.context.summary_chars == 0 {
            return Err(ConfigError::ValidationError(
                "context.summary_chars must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::EnvError {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid value for {key}: {value:?}")]
    EnvError { key: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
