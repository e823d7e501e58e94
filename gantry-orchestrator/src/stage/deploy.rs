//! Deploy stage
//!
//! Resolves the fleet's membership when the stage runs and delivers the
//! artifact to every member concurrently. Targets that succeeded are left
//! as they are when others fail; there is no rollback.

use gantry_core::domain::artifact::Artifact;
use gantry_core::domain::failure::StageFailure;
use gantry_core::domain::fleet::{DeployResult, TargetId};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::ports::FleetManager;

pub struct DeployStage {
    fleet: Arc<dyn FleetManager>,
}

impl DeployStage {
    pub fn new(fleet: Arc<dyn FleetManager>) -> Self {
        Self { fleet }
    }

    pub async fn deploy(
        &self,
        artifact: &Artifact,
        selector: &str,
    ) -> Result<DeployResult, StageFailure> {
        let targets = self.fleet.list_targets(selector).await.map_err(|e| {
            error!("Failed to list targets of fleet '{}': {}", selector, e);
            StageFailure::FleetUnavailable {
                fleet: selector.to_string(),
                reason: e.to_string(),
            }
        })?;

        if targets.is_empty() {
            warn!("Fleet '{}' resolved to no targets", selector);
            return Err(StageFailure::EmptyFleet {
                fleet: selector.to_string(),
            });
        }

        debug!(
            "Delivering artifact {} to {} target(s)",
            artifact.id,
            targets.len()
        );

        let mut deliveries = JoinSet::new();
        for target in targets {
            let fleet = Arc::clone(&self.fleet);
            let artifact = artifact.clone();
            deliveries.spawn(async move {
                let result = fleet.deliver(&target, &artifact).await;
                (target, result)
            });
        }

        let mut delivered: Vec<TargetId> = Vec::new();
        let mut failing: Vec<TargetId> = Vec::new();

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((target, Ok(()))) => delivered.push(target),
                Ok((target, Err(e))) => {
                    warn!("Delivery to {} failed: {}", target, e);
                    failing.push(target);
                }
                Err(e) => {
                    // A panicked delivery task loses its target id
                    error!("Delivery task panicked: {}", e);
                    failing.push("<unknown>".to_string());
                }
            }
        }

        if !failing.is_empty() {
            failing.sort();
            return Err(StageFailure::DeployFailed {
                failing_targets: failing,
            });
        }

        delivered.sort();
        Ok(DeployResult {
            fleet: selector.to_string(),
            delivered,
        })
    }
}
