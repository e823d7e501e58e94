//! Execution command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use gantry_client::OrchestratorClient;
use gantry_core::domain::execution::{Execution, Trigger};
use gantry_core::dto::execution::ExecutionSummary;

use crate::config::Config;
use crate::id_resolver::{resolve_execution_id, resolve_pipeline_id};
use crate::types::IdOrPrefix;

/// Execution subcommands
#[derive(Subcommand)]
pub enum ExecutionCommands {
    /// Show an execution and its stage history
    Get {
        /// Execution ID or unambiguous prefix
        id: String,
    },
    /// List executions of a pipeline
    List {
        /// Pipeline ID or unambiguous prefix
        pipeline_id: String,
    },
    /// Cancel a running execution
    Cancel {
        /// Execution ID or unambiguous prefix
        id: String,
    },
}

/// Handle execution commands
pub async fn handle_execution_command(command: ExecutionCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        ExecutionCommands::Get { id } => get_execution(&client, &id).await,
        ExecutionCommands::List { pipeline_id } => list_executions(&client, &pipeline_id).await,
        ExecutionCommands::Cancel { id } => cancel_execution(&client, &id).await,
    }
}

async fn get_execution(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_execution_id(client, &IdOrPrefix::parse(id)?).await?;

    let execution = client.get_execution(uuid).await?;
    print_execution_details(&execution);

    Ok(())
}

async fn list_executions(client: &OrchestratorClient, pipeline_id: &str) -> Result<()> {
    let pipeline_uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(pipeline_id)?).await?;

    let executions = client.list_executions(pipeline_uuid).await?;

    if executions.is_empty() {
        println!(
            "{}",
            format!("No executions found for pipeline {}.", pipeline_uuid).yellow()
        );
    } else {
        println!(
            "{}",
            format!(
                "Found {} execution(s) for pipeline {}:",
                executions.len(),
                pipeline_uuid
            )
            .bold()
        );
        println!();
        for execution in executions {
            print_execution_summary(&execution);
        }
    }

    Ok(())
}

async fn cancel_execution(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_execution_id(client, &IdOrPrefix::parse(id)?).await?;

    let execution = client.cancel_execution(uuid).await?;

    println!(
        "{}",
        format!("✓ Execution {} cancelled", execution.id).green().bold()
    );
    if let Some(stage) = execution.stages.last() {
        println!("  Stopped at: {}", stage.name.bold());
    }

    Ok(())
}

fn print_execution_summary(execution: &ExecutionSummary) {
    println!(
        "  {} Execution {}",
        "▸".cyan(),
        execution.id.to_string().dimmed()
    );
    println!(
        "    Status:  {} (v{})",
        super::colorize_status(execution.status),
        execution.pipeline_version
    );
    if let Some(stage) = &execution.current_stage {
        println!("    Stage:   {}", stage);
    }
    if let Some(failure) = &execution.failure {
        println!("    Failure: {}", failure.red());
    }
    println!(
        "    Started: {}",
        execution
            .started_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_execution_details(execution: &Execution) {
    println!("{}", "Execution Details:".bold());
    println!("  ID:        {}", execution.id.to_string().cyan());
    println!(
        "  Pipeline:  {} (v{})",
        execution.pipeline_id.to_string().dimmed(),
        execution.pipeline_version
    );
    println!("  Status:    {}", super::colorize_status(execution.status));
    println!("  Trigger:   {}", describe_trigger(&execution.trigger));
    println!(
        "  Started:   {}",
        execution.started_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(finished) = execution.finished_at {
        println!("  Finished:  {}", finished.format("%Y-%m-%d %H:%M:%S"));
        let duration = finished.signed_duration_since(execution.started_at);
        println!("  Duration:  {}s", duration.num_seconds());
    }

    if !execution.stages.is_empty() {
        println!("\n{}", "Stages:".bold());
        for stage in &execution.stages {
            println!(
                "  {} {}",
                super::colorize_stage_status(stage.status),
                stage.name.bold()
            );
            if let Some(artifact) = &stage.produced_artifact {
                println!(
                    "      artifact {} at {}",
                    artifact.id.to_string().dimmed(),
                    artifact.payload_location
                );
            }
            if let Some(reason) = &stage.failure_reason {
                println!("      {}", reason.to_string().red());
            }
        }
    }

    if let Some(failure) = &execution.failure {
        println!("\n{}", "Failure:".bold());
        println!(
            "  {} in stage {} ({})",
            failure.reason.kind().red(),
            failure.stage_name.bold(),
            failure.stage_index
        );
        println!("  {}", failure.reason);
    }
}

fn describe_trigger(trigger: &Trigger) -> String {
    match trigger {
        Trigger::Manual { git_ref: None } => "manual".to_string(),
        Trigger::Manual {
            git_ref: Some(git_ref),
        } => format!("manual @ {}", git_ref),
        Trigger::SourceChange { commit } => format!("source change {}", commit),
    }
}
