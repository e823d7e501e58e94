//! Build stage
//!
//! Runs a build spec's phases, in order, inside one isolated environment
//! seeded with the input artifact. The first failing command stops the build;
//! only a fully successful run yields an output artifact.

use gantry_core::domain::artifact::Artifact;
use gantry_core::domain::buildspec::BuildSpec;
use gantry_core::domain::failure::StageFailure;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::StageContext;
use crate::ports::{ExecutionEnvironment, IsolatedRun};

pub struct BuildStage {
    environment: Arc<dyn ExecutionEnvironment>,
}

impl BuildStage {
    pub fn new(environment: Arc<dyn ExecutionEnvironment>) -> Self {
        Self { environment }
    }

    pub async fn build(
        &self,
        ctx: &StageContext,
        input: Option<&Artifact>,
        spec: &BuildSpec,
    ) -> Result<Artifact, StageFailure> {
        if input.is_none() {
            warn!(
                "Build stage '{}' has no input artifact, starting from an empty workspace",
                ctx.stage_name
            );
        }

        let run = IsolatedRun {
            label: ctx.label(),
            image: spec.image.clone(),
            commands: spec.commands(),
            input_location: input.map(|a| a.payload_location.clone()),
            outputs: spec.artifacts.clone(),
        };

        let outcome = self.environment.run_isolated(run).await.map_err(|e| {
            error!("Execution environment failed for '{}': {}", ctx.stage_name, e);
            StageFailure::EnvironmentUnavailable {
                reason: e.to_string(),
            }
        })?;

        if !outcome.succeeded() {
            let phase = outcome
                .commands_run
                .checked_sub(1)
                .and_then(|index| spec.phase_of_command(index))
                .map(str::to_string);

            error!(
                "Build '{}' failed in phase {:?} with exit code {} (log: {})",
                ctx.stage_name, phase, outcome.exit_code, outcome.log_ref
            );

            return Err(StageFailure::BuildFailed {
                log_ref: outcome.log_ref,
                phase,
            });
        }

        let location = outcome
            .output_location
            .ok_or_else(|| StageFailure::BuildFailed {
                log_ref: outcome.log_ref.clone(),
                phase: None,
            })?;

        info!(
            "Build '{}' ran {} command(s), outputs at {}",
            ctx.stage_name, outcome.commands_run, location
        );

        Ok(Artifact::new(&ctx.stage_name, location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEnvironment;
    use gantry_core::domain::buildspec::{ArtifactPaths, Phase};
    use gantry_core::domain::execution::Trigger;
    use uuid::Uuid;

    fn context() -> StageContext {
        StageContext {
            execution_id: Uuid::new_v4(),
            pipeline_name: "web".to_string(),
            stage_index: 1,
            stage_name: "Build".to_string(),
            trigger: Trigger::manual(),
        }
    }

    fn spec() -> BuildSpec {
        BuildSpec {
            image: "docker.io/library/node:20".to_string(),
            phases: vec![
                Phase {
                    name: "install".to_string(),
                    commands: vec!["npm ci".to_string()],
                },
                Phase {
                    name: "build".to_string(),
                    commands: vec!["npm test".to_string(), "npm run build".to_string()],
                },
            ],
            artifacts: ArtifactPaths {
                files: vec!["dist/**/*".to_string()],
                base_directory: None,
            },
        }
    }

    #[tokio::test]
    async fn test_successful_build_produces_new_artifact() {
        let env = Arc::new(ScriptedEnvironment::succeeding());
        let stage = BuildStage::new(env.clone());
        let input = Artifact::new("Source", "snapshots/app/c0ffee");

        let output = stage.build(&context(), Some(&input), &spec()).await.unwrap();

        assert_ne!(output.id, input.id);
        assert_eq!(output.producing_stage, "Build");

        let runs = env.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].commands, vec!["npm ci", "npm test", "npm run build"]);
        assert_eq!(
            runs[0].input_location.as_deref(),
            Some("snapshots/app/c0ffee")
        );
    }

    #[tokio::test]
    async fn test_failing_command_names_its_phase() {
        let stage = BuildStage::new(Arc::new(ScriptedEnvironment::failing_at(1)));
        let input = Artifact::new("Source", "snapshots/app/c0ffee");

        let result = stage.build(&context(), Some(&input), &spec()).await;

        match result {
            Err(StageFailure::BuildFailed { log_ref, phase }) => {
                assert!(!log_ref.is_empty());
                assert_eq!(phase.as_deref(), Some("build"));
            }
            other => panic!("expected BuildFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_environment_error_is_reported() {
        let stage = BuildStage::new(Arc::new(ScriptedEnvironment::broken()));

        let result = stage.build(&context(), None, &spec()).await;

        assert!(matches!(
            result,
            Err(StageFailure::EnvironmentUnavailable { .. })
        ));
    }
}
