//! Progressive discovery: read tool manifests without loading tools.
//!
//! A source is either a manifest file (a JSON array of manifest records)
//! or a directory. In a directory, a manifest file with the configured
//! name wins; without one, every `*.json` / `*.toml` descriptor in the
//! directory is read as plain data. Nothing found here is ever executed:
//! descriptors are deserialized, never evaluated.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use toolflow_core::error::{Error, Result};
use toolflow_core::tool::{ToolCategory, ToolManifest};
use tracing::{debug, warn};

/// Lenient per-artifact descriptor. Everything is optional; gaps are
/// filled from the file itself.
#[derive(Debug, Default, Deserialize)]
struct ToolDescriptor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<ToolCategory>,
    #[serde(default)]
    schema: Option<serde_json::Value>,
    #[serde(default)]
    enabled: Option<bool>,
}

/// Scan a source and return every manifest it declares.
pub fn scan(source: &Path, manifest_file: &str) -> Result<Vec<ToolManifest>> {
    if source.is_file() {
        return read_manifest_file(source);
    }

    if source.is_dir() {
        let candidate = source.join(manifest_file);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "Using manifest file");
            return read_manifest_file(&candidate);
        }
        debug!(dir = %source.display(), "No manifest file, scanning descriptors");
        return scan_dir(source);
    }

    Err(Error::Discovery(format!(
        "manifest source not found: {}",
        source.display()
    )))
}

/// Parse a manifest file: a flat JSON array of manifest records.
pub fn read_manifest_file(path: &Path) -> Result<Vec<ToolManifest>> {
    let content = std::fs::read_to_string(path)?;
    let manifests: Vec<ToolManifest> = serde_json::from_str(&content).map_err(|e| {
        Error::Discovery(format!("failed to parse {}: {e}", path.display()))
    })?;
    Ok(manifests)
}

fn scan_dir(dir: &Path) -> Result<Vec<ToolManifest>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_descriptor(p))
        .collect();
    files.sort();

    let mut manifests = Vec::with_capacity(files.len());
    for path in files {
        match read_descriptor(&path) {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable tool descriptor"),
        }
    }
    Ok(manifests)
}

fn is_descriptor(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json") | Some("toml")
    )
}

fn read_descriptor(path: &Path) -> Result<ToolManifest> {
    let content = std::fs::read_to_string(path)?;
    let descriptor: ToolDescriptor = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| Error::Discovery(e.to_string()))?,
        _ => serde_json::from_str(&content)?,
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches(".tool").to_string())
        .unwrap_or_default();
    let name = descriptor.name.unwrap_or(stem);
    if name.is_empty() {
        return Err(Error::InvalidManifest(format!(
            "descriptor {} has no name",
            path.display()
        )));
    }

    Ok(ToolManifest {
        name,
        path: path.display().to_string(),
        version: descriptor.version.unwrap_or_else(|| "0.1.0".into()),
        description: descriptor.description.unwrap_or_default(),
        category: descriptor.category.unwrap_or_default(),
        schema: descriptor.schema,
        enabled: descriptor.enabled.unwrap_or(true),
    })
}
