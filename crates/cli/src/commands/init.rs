//! `toolflow init`: write the default config file.

use std::path::Path;
use toolflow_config::AppConfig;

use super::config_path;

pub fn run(path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path(path);
    if path.exists() && !force {
        println!("Config already exists: {} (use --force to overwrite)", path.display());
        return Ok(());
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("✅ Wrote default config: {}", path.display());
    Ok(())
}
