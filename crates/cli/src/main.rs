//! toolflow CLI: the main entry point.
//!
//! Commands:
//! - `run`     Execute a workflow definition
//! - `tools`   List or search the known tools
//! - `init`    Write the default config file
//! - `doctor`  Diagnose config and manifest problems

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "toolflow",
    about = "toolflow: budgeted, deterministic tool workflows for LLM agents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.toolflow/config.toml)
    #[arg(short, long, global = true, env = "TOOLFLOW_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow definition (.toml or .json)
    Run {
        /// Workflow file
        workflow: PathBuf,

        /// Workflow variable, repeatable. Values are parsed as JSON when possible.
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = commands::run::parse_var)]
        vars: Vec<(String, Value)>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,

        /// Also print the recorded span tree
        #[arg(long)]
        trace: bool,
    },

    /// List known tools
    Tools {
        /// Case-insensitive filter over name, description and category
        #[arg(short, long)]
        search: Option<String>,

        /// Include disabled tools
        #[arg(long)]
        all: bool,
    },

    /// Write the default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Diagnose config and manifest problems
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            workflow,
            vars,
            json,
            trace,
        } => {
            let success = commands::run::run(config, &workflow, vars, json, trace).await?;
            if !success {
                std::process::exit(1);
            }
        }
        Commands::Tools { search, all } => commands::tools::run(config, search.as_deref(), all)?,
        Commands::Init { force } => commands::init::run(config, force)?,
        Commands::Doctor => commands::doctor::run(config)?,
    }

    Ok(())
}
