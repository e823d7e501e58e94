//! `gantry` command-line tool
//!
//! Defines and redefines release pipelines from YAML files, starts and
//! cancels their executions, and records approval decisions. Every command
//! except `init` talks to a running orchestrator over HTTP.

mod commands;
mod config;
mod id_resolver;
mod pipeline_file;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "gantry", version)]
#[command(about = "Drive Gantry release pipelines from the terminal", long_about = None)]
struct Cli {
    /// Base URL of the Gantry orchestrator
    #[arg(
        long,
        global = true,
        env = "GANTRY_ORCHESTRATOR_URL",
        default_value = "http://localhost:8080"
    )]
    orchestrator_url: String,

    /// Plain output without ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = Config {
        orchestrator_url: cli.orchestrator_url.trim_end_matches('/').to_string(),
    };

    handle_command(cli.command, &config).await
}
