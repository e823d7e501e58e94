//! Pipeline command handlers
//!
//! Handles pipeline creation from pipeline files, listing, viewing,
//! redefinition, and starting executions.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use gantry_client::OrchestratorClient;
use gantry_core::domain::pipeline::{PipelineDefinition, StageKind};
use gantry_core::dto::execution::StartExecution;
use gantry_core::dto::pipeline::{CreatePipeline, PipelineSummary, RedefinePipeline};
use std::path::PathBuf;

use crate::config::Config;
use crate::id_resolver::resolve_pipeline_id;
use crate::pipeline_file::PipelineFile;
use crate::types::IdOrPrefix;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Create a new pipeline from a pipeline file
    Create {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        file: PathBuf,

        /// Override the pipeline name from the file
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List all pipelines
    List,
    /// Get pipeline details
    Get {
        /// Pipeline ID or unambiguous prefix
        id: String,

        /// Show a specific stored version instead of the latest
        #[arg(long)]
        version: Option<u32>,
    },
    /// Replace a pipeline's stages, restarting its running executions
    Update {
        /// Pipeline ID or unambiguous prefix
        id: String,

        /// Path to the pipeline YAML file
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Start an execution of a pipeline
    Start {
        /// Pipeline ID or unambiguous prefix
        id: String,

        /// Branch, tag or commit to build instead of the configured branch
        #[arg(long = "ref")]
        git_ref: Option<String>,
    },
}

/// Handle pipeline commands
pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        PipelineCommands::Create { file, name } => create_pipeline(&client, file, name).await,
        PipelineCommands::List => list_pipelines(&client).await,
        PipelineCommands::Get { id, version } => get_pipeline(&client, &id, version).await,
        PipelineCommands::Update { id, file } => update_pipeline(&client, &id, file).await,
        PipelineCommands::Start { id, git_ref } => start_pipeline(&client, &id, git_ref).await,
    }
}

async fn create_pipeline(
    client: &OrchestratorClient,
    path: PathBuf,
    name_override: Option<String>,
) -> Result<()> {
    let file = PipelineFile::load(&path)?;
    let name = file.name_or(name_override)?;

    let pipeline = client
        .create_pipeline(CreatePipeline {
            name,
            stages: file.stages,
        })
        .await?;

    println!("{}", "✓ Pipeline created successfully!".green().bold());
    println!("  ID:      {}", pipeline.id.to_string().cyan());
    println!("  Name:    {}", pipeline.name.bold());
    println!("  Version: {}", pipeline.version);
    println!("  Stages:  {}", stage_names(&pipeline).dimmed());

    Ok(())
}

async fn list_pipelines(client: &OrchestratorClient) -> Result<()> {
    let pipelines = client.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} pipeline(s):", pipelines.len()).bold()
        );
        println!();
        for pipeline in pipelines {
            print_pipeline_summary(&pipeline);
        }
    }

    Ok(())
}

async fn get_pipeline(client: &OrchestratorClient, id: &str, version: Option<u32>) -> Result<()> {
    let uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(id)?).await?;

    let pipeline = match version {
        Some(version) => client.get_pipeline_version(uuid, version).await?,
        None => client.get_pipeline(uuid).await?,
    };

    print_pipeline_details(&pipeline);

    Ok(())
}

async fn update_pipeline(client: &OrchestratorClient, id: &str, path: PathBuf) -> Result<()> {
    let uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(id)?).await?;
    let file = PipelineFile::load(&path)?;

    let pipeline = client
        .redefine_pipeline(
            uuid,
            RedefinePipeline {
                stages: file.stages,
            },
        )
        .await?;

    println!(
        "{}",
        format!("✓ Pipeline {} is now at version {}", pipeline.name, pipeline.version)
            .green()
            .bold()
    );
    println!("  Stages: {}", stage_names(&pipeline).dimmed());
    println!(
        "  {}",
        "Running executions were restarted on the new version.".dimmed()
    );

    Ok(())
}

async fn start_pipeline(
    client: &OrchestratorClient,
    id: &str,
    git_ref: Option<String>,
) -> Result<()> {
    let uuid = resolve_pipeline_id(client, &IdOrPrefix::parse(id)?).await?;

    let execution = client
        .start_pipeline(uuid, StartExecution { git_ref })
        .await?;

    println!("{}", "✓ Execution started!".green().bold());
    println!("  Execution ID: {}", execution.id.to_string().cyan());
    println!(
        "  Pipeline:     {} (v{})",
        execution.pipeline_id.to_string().dimmed(),
        execution.pipeline_version
    );
    println!("  Status:       {}", super::colorize_status(execution.status));
    println!(
        "  Started:      {}",
        execution.started_at.format("%Y-%m-%d %H:%M:%S")
    );

    Ok(())
}

fn stage_names(pipeline: &PipelineDefinition) -> String {
    pipeline
        .stages
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(" → ")
}

fn print_pipeline_summary(pipeline: &PipelineSummary) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        pipeline.name.bold(),
        format!("v{}", pipeline.version).dimmed()
    );
    println!("    ID:      {}", pipeline.id.to_string().dimmed());
    println!("    Stages:  {}", pipeline.stage_names.join(" → ").dimmed());
    println!(
        "    Updated: {}",
        pipeline
            .updated_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_pipeline_details(pipeline: &PipelineDefinition) {
    println!("{}", "Pipeline Details:".bold());
    println!("  ID:      {}", pipeline.id.to_string().cyan());
    println!("  Name:    {}", pipeline.name.bold());
    println!("  Version: {}", pipeline.version);
    println!(
        "  Created: {}",
        pipeline.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated: {}",
        pipeline.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    println!("\n{}", "Stages:".bold());
    for (index, stage) in pipeline.stages.iter().enumerate() {
        println!(
            "  {}. {} {}",
            index + 1,
            stage.name.bold(),
            format!("[{}]", stage.kind.label()).dimmed()
        );
        match &stage.kind {
            StageKind::Source(config) => {
                println!("       {} @ {}", config.repository, config.branch.cyan());
            }
            StageKind::Build(config) => {
                println!("       image: {}", config.buildspec.image);
                for phase in &config.buildspec.phases {
                    println!("       {}:", phase.name.cyan());
                    for command in &phase.commands {
                        println!("         $ {}", command);
                    }
                }
            }
            StageKind::Approval(config) => {
                let timeout = config
                    .timeout_seconds
                    .map(|s| format!("{}s", s))
                    .unwrap_or_else(|| "none".to_string());
                println!("       topic: {}, timeout: {}", config.topic.cyan(), timeout);
            }
            StageKind::Deploy(config) => {
                println!("       fleet: {}", config.fleet.cyan());
            }
        }
    }
}
