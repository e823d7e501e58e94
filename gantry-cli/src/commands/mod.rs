//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod approval;
mod execution;
mod init;
mod pipeline;

pub use approval::ApprovalCommands;
pub use execution::ExecutionCommands;
pub use init::InitArgs;
pub use pipeline::PipelineCommands;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use gantry_core::domain::execution::{ExecutionStatus, StageStatus};

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline management
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Execution status and control
    Execution {
        #[command(subcommand)]
        command: ExecutionCommands,
    },
    /// Approval requests and decisions
    Approval {
        #[command(subcommand)]
        command: ApprovalCommands,
    },
    /// Write a starter pipeline file and build spec
    Init(InitArgs),
    /// Check that the orchestrator is reachable
    Health,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Execution { command } => {
            execution::handle_execution_command(command, config).await
        }
        Commands::Approval { command } => approval::handle_approval_command(command, config).await,
        Commands::Init(args) => init::handle_init(args),
        Commands::Health => health(config).await,
    }
}

async fn health(config: &Config) -> Result<()> {
    let status = config.client().health().await?;
    println!("{} {}", "✓".green(), config.orchestrator_url.cyan());
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Colorize execution status for display
pub(crate) fn colorize_status(status: ExecutionStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        ExecutionStatus::Running => status_str.cyan(),
        ExecutionStatus::Succeeded => status_str.green(),
        ExecutionStatus::Failed => status_str.red(),
        ExecutionStatus::Cancelled => status_str.dimmed(),
    }
}

pub(crate) fn colorize_stage_status(status: StageStatus) -> ColoredString {
    let status_str = format!("{:?}", status);
    match status {
        StageStatus::Running => status_str.cyan(),
        StageStatus::Succeeded => status_str.green(),
        StageStatus::Failed => status_str.red(),
        StageStatus::Cancelled => status_str.dimmed(),
    }
}
