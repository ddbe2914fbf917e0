//! `toolflow doctor`: diagnose config and manifest problems.

use std::path::Path;
use toolflow_tools::discovery;

use super::{build_registry, config_path, load_config};

pub fn run(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 toolflow doctor");
    println!("==================\n");

    let mut issues = 0;

    let file = config_path(path);
    if !file.exists() {
        println!("  ⚠️  No config file at {}, defaults in use (run `toolflow init`)", file.display());
    }

    let config = match load_config(path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            println!(
                "     budget {} tokens (reserve {}), step timeout {}ms, workflow timeout {}ms, {} retries",
                config.budget.token_budget,
                config.budget.reserve_tokens,
                config.execution.step_timeout_ms,
                config.execution.workflow_timeout_ms,
                config.execution.retries
            );
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found.");
            return Ok(());
        }
    };

    match &config.registry.manifest_source {
        None => println!("  ⚠️  No manifest source configured, built-in tools only"),
        Some(source) => match discovery::scan(Path::new(source), &config.registry.manifest_file) {
            Ok(manifests) => {
                let disabled = manifests.iter().filter(|m| !m.enabled).count();
                println!(
                    "  ✅ Manifest source {source}: {} tool(s), {disabled} disabled",
                    manifests.len()
                );
            }
            Err(e) => {
                println!("  ❌ Manifest source {source}: {e}");
                issues += 1;
            }
        },
    }

    match build_registry(&config) {
        Ok(registry) => println!("  ✅ Registry ready: {} tool(s) enabled", registry.list_tools().len()),
        Err(e) => {
            println!("  ❌ Registry failed: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}
