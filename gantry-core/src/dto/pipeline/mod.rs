//! Pipeline DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::{PipelineDefinition, StageDescriptor};

/// Request to create a new pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub name: String,
    pub stages: Vec<StageDescriptor>,
}

/// Request to replace the stages of an existing pipeline
///
/// Produces a new definition version. Running executions of the pipeline are
/// cancelled and restarted against the new version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedefinePipeline {
    pub stages: Vec<StageDescriptor>,
}

/// Lightweight pipeline summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub stage_names: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<PipelineDefinition> for PipelineSummary {
    fn from(definition: PipelineDefinition) -> Self {
        Self {
            id: definition.id,
            name: definition.name,
            version: definition.version,
            stage_names: definition.stages.into_iter().map(|s| s.name).collect(),
            updated_at: definition.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::{DeployConfig, StageKind};

    #[test]
    fn test_pipeline_summary_conversion() {
        let now = Utc::now();
        let definition = PipelineDefinition {
            id: Uuid::new_v4(),
            name: "web".to_string(),
            version: 3,
            stages: vec![StageDescriptor {
                name: "Deploy".to_string(),
                kind: StageKind::Deploy(DeployConfig {
                    fleet: "web".to_string(),
                }),
            }],
            created_at: now,
            updated_at: now,
        };

        let summary: PipelineSummary = definition.clone().into();
        assert_eq!(summary.id, definition.id);
        assert_eq!(summary.version, 3);
        assert_eq!(summary.stage_names, vec!["Deploy".to_string()]);
    }
}
