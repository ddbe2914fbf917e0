//! `toolflow tools`: list or search the known tools.

use std::path::Path;

use super::{build_registry, load_config};

pub fn run(
    config_path: Option<&Path>,
    search: Option<&str>,
    all: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let registry = build_registry(&config)?;

    let tools = match search {
        Some(query) => registry.search_tools(query),
        None if all => registry.list_all(),
        None => registry.list_tools(),
    };

    if tools.is_empty() {
        println!("No tools found.");
        return Ok(());
    }

    let width = tools.iter().map(|t| t.name.len()).max().unwrap_or(0);
    for tool in &tools {
        let status = if tool.enabled { "" } else { " [disabled]" };
        println!(
            "  {:<width$}  {:<9}  v{:<8}  {}{}",
            tool.name, tool.category, tool.version, tool.description, status
        );
    }
    println!("\n{} tool(s)", tools.len());
    Ok(())
}
