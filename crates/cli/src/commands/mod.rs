//! CLI subcommands and the setup they share.

pub mod doctor;
pub mod init;
pub mod run;
pub mod tools;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use toolflow_config::{AppConfig, ConfigError};
use toolflow_tools::{ToolRegistry, register_builtins};
use tracing::warn;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
}

/// Where `init` writes and `doctor` looks.
pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Built-ins first, then whatever the manifest source declares.
///
/// A missing manifest source is logged, not fatal: the built-ins still
/// work without it.
pub fn build_registry(config: &AppConfig) -> toolflow_core::Result<Arc<ToolRegistry>> {
    let registry = ToolRegistry::new().with_manifest_file(config.registry.manifest_file.clone());
    if config.registry.builtins {
        register_builtins(&registry)?;
    }

    if let Some(source) = &config.registry.manifest_source {
        let path = Path::new(source);
        if path.exists() {
            registry.discover(path)?;
        } else {
            warn!(source = %path.display(), "Manifest source not found, using built-in tools only");
        }
    }

    Ok(Arc::new(registry))
}
