//! Stage layer
//!
//! One module per stage kind. Each stage talks to exactly one collaborator and
//! reports either its output or a [`StageFailure`]; sequencing, recording and
//! cancellation belong to the orchestrator.

pub mod approval;
pub mod build;
pub mod deploy;
pub mod source;

pub use approval::{ApprovalGate, DecisionError, GateRegistry};
pub use build::BuildStage;
pub use deploy::DeployStage;
pub use source::SourceStage;

use gantry_core::domain::artifact::Artifact;
use gantry_core::domain::execution::Trigger;
use gantry_core::domain::failure::StageFailure;
use gantry_core::domain::pipeline::StageKind;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::ports::Collaborators;
use crate::repository::Store;

/// Identifies the stage invocation being run
#[derive(Debug, Clone)]
pub struct StageContext {
    pub execution_id: Uuid,
    pub pipeline_name: String,
    pub stage_index: usize,
    pub stage_name: String,
    pub trigger: Trigger,
}

impl StageContext {
    /// Label used to name resources created for this invocation
    pub fn label(&self) -> String {
        format!("{}-{}", self.execution_id, self.stage_index)
    }
}

/// What a successful stage hands back
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    /// Newly produced artifact; `None` for stages that only gate or deliver
    pub artifact: Option<Artifact>,
}

/// Dispatches stage descriptors to their implementations
pub struct Stages {
    source: SourceStage,
    build: BuildStage,
    approval: ApprovalGate,
    deploy: DeployStage,
}

impl Stages {
    pub fn new(collaborators: Collaborators, store: Arc<dyn Store>, project: String) -> Self {
        Self {
            source: SourceStage::new(collaborators.source),
            build: BuildStage::new(collaborators.environment),
            approval: ApprovalGate::new(collaborators.notifier, store, project),
            deploy: DeployStage::new(collaborators.fleet),
        }
    }

    pub fn approval(&self) -> &ApprovalGate {
        &self.approval
    }

    /// Runs one stage with the most recent artifact as input
    pub async fn run(
        &self,
        ctx: &StageContext,
        kind: &StageKind,
        input: Option<&Artifact>,
    ) -> Result<StageOutput, StageFailure> {
        info!(
            "Execution {}: running {} stage '{}'",
            ctx.execution_id,
            kind.label(),
            ctx.stage_name
        );

        match kind {
            StageKind::Source(config) => {
                let artifact = self.source.fetch(ctx, config).await?;
                Ok(StageOutput {
                    artifact: Some(artifact),
                })
            }
            StageKind::Build(config) => {
                let artifact = self.build.build(ctx, input, &config.buildspec).await?;
                Ok(StageOutput {
                    artifact: Some(artifact),
                })
            }
            StageKind::Approval(config) => {
                self.approval.await_decision(ctx, input, config).await?;
                Ok(StageOutput::default())
            }
            StageKind::Deploy(config) => {
                let artifact = input.ok_or(StageFailure::MissingArtifact)?;
                let result = self.deploy.deploy(artifact, &config.fleet).await?;
                info!(
                    "Execution {}: delivered to {} target(s) in fleet '{}'",
                    ctx.execution_id,
                    result.delivered.len(),
                    result.fleet
                );
                Ok(StageOutput::default())
            }
        }
    }
}
