//! Source stage
//!
//! Snapshots the repository at the trigger's ref (or the configured branch)
//! and emits it unchanged as the first artifact. Resolution failures are
//! terminal; there is no retry here.

use gantry_core::domain::artifact::Artifact;
use gantry_core::domain::failure::StageFailure;
use gantry_core::domain::pipeline::SourceConfig;
use std::sync::Arc;
use tracing::{error, info};

use super::StageContext;
use crate::ports::SourceControl;

pub struct SourceStage {
    source: Arc<dyn SourceControl>,
}

impl SourceStage {
    pub fn new(source: Arc<dyn SourceControl>) -> Self {
        Self { source }
    }

    pub async fn fetch(
        &self,
        ctx: &StageContext,
        config: &SourceConfig,
    ) -> Result<Artifact, StageFailure> {
        let git_ref = ctx.trigger.ref_override().unwrap_or(&config.branch);

        let snapshot = self
            .source
            .resolve_ref(&config.repository, git_ref)
            .await
            .map_err(|e| {
                error!(
                    "Failed to resolve {}@{}: {}",
                    config.repository, git_ref, e
                );
                StageFailure::SourceUnavailable {
                    reason: format!("{}@{}: {}", config.repository, git_ref, e),
                }
            })?;

        info!(
            "Resolved {}@{} to commit {}",
            config.repository, git_ref, snapshot.commit
        );

        Ok(Artifact::new(&ctx.stage_name, snapshot.location))
    }
}
