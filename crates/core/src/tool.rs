//! Tool trait and manifest: the abstraction over agent capabilities.
//!
//! A tool is anything that takes a JSON parameter bag and asynchronously
//! yields a JSON result or fails. How it gets there (HTTP, subprocess,
//! in-process code) is the implementation's business. The manifest is the
//! metadata a registry can hold about a tool without having loaded it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::error::ToolError;

/// The core Tool trait.
///
/// Every capability the executor can dispatch to implements this one
/// method. Implementations should be stateless or internally synchronized;
/// the registry shares one instance across every workflow.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Execute the tool with the given parameters.
    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// Adapter turning an async closure into a [`Tool`].
pub struct FnTool<F> {
    f: F,
}

impl<F> FnTool<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
{
    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        (self.f)(params).await
    }
}

/// Wrap an async closure as a shareable tool instance.
pub fn tool_fn<F, Fut>(f: F) -> Arc<dyn Tool>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
{
    Arc::new(FnTool::new(f))
}

/// Broad family a tool belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// Backed by an external capability server.
    Mcp,
    /// Implemented in-process.
    #[default]
    Native,
    /// Adapter over a third-party system (CRM, HTTP API, ...).
    Connector,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mcp => write!(f, "mcp"),
            Self::Native => write!(f, "native"),
            Self::Connector => write!(f, "connector"),
        }
    }
}

/// Identity and metadata for a capability.
///
/// This is also the on-disk record format: a manifest file is a JSON
/// array of these, field names exactly as below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolManifest {
    /// Unique key in the registry.
    pub name: String,

    /// Locator used to resolve the implementation.
    #[serde(default)]
    pub path: String,

    /// Semantic version (`MAJOR.MINOR.PATCH`).
    #[serde(default = "default_version")]
    pub version: String,

    /// Human description (shown to the model).
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub category: ToolCategory,

    /// Optional input/output shape, kept as opaque JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_version() -> String {
    "0.1.0".into()
}

fn default_true() -> bool {
    true
}

impl ToolManifest {
    /// A minimal enabled native manifest; `path` defaults to the name.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            version: default_version(),
            description: description.into(),
            category: ToolCategory::Native,
            schema: None,
            enabled: true,
        }
    }

    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Case-insensitive match over name, description and category.
    pub fn matches(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.name.to_lowercase().contains(&q)
            || self.description.to_lowercase().contains(&q)
            || self.category.to_string() == q
    }
}
