//! Built-in native tools.
//!
//! Real capabilities (HTTP connectors, CRM adapters, ...) live outside
//! this workspace. These two exist so a fresh install can run a workflow
//! end to end and so timeout behaviour can be exercised from the CLI.

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use toolflow_core::error::ToolError;
use toolflow_core::tool::{ToolManifest, tool_fn};

use crate::registry::ToolRegistry;

/// Upper bound for the `delay` tool.
const MAX_DELAY_MS: u64 = 60_000;

/// Register `echo` and `delay` on an existing registry.
pub fn register_builtins(registry: &ToolRegistry) -> toolflow_core::Result<()> {
    registry.register_tool(
        ToolManifest::new("echo", "Return the given parameters unchanged.")
            .with_path("builtin/echo")
            .with_schema(json!({"type": "object"})),
        tool_fn(|params| async move { Ok(params) }),
    )?;

    registry.register_tool(
        ToolManifest::new("delay", "Sleep for `ms` milliseconds, then report how long it waited.")
            .with_path("builtin/delay")
            .with_schema(json!({
                "type": "object",
                "properties": { "ms": { "type": "integer", "minimum": 0 } },
                "required": ["ms"]
            })),
        tool_fn(|params: Value| async move {
            let ms = params["ms"]
                .as_u64()
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'ms' argument".into()))?;
            if ms > MAX_DELAY_MS {
                return Err(ToolError::InvalidArguments(format!(
                    "'ms' must be at most {MAX_DELAY_MS}"
                )));
            }
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(json!({ "slept_ms": ms }))
        }),
    )?;

    Ok(())
}

/// Create a registry holding only the built-in tools.
pub fn builtin_registry() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    if let Err(e) = register_builtins(&registry) {
        tracing::error!(error = %e, "Failed to register built-in tools");
    }
    Arc::new(registry)
}
