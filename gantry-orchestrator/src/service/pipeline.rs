//! Pipeline Service
//!
//! Registry of pipeline definitions. Every stored version is kept; reads
//! return the latest unless a version is asked for.

use gantry_core::domain::pipeline::{DefinitionError, PipelineDefinition};
use gantry_core::dto::pipeline::{CreatePipeline, PipelineSummary, RedefinePipeline};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::repository::{Store, StoreError};
use crate::service::orchestrator::{self, Orchestrator};

/// Service error type
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline {0} not found")]
    NotFound(Uuid),

    #[error("pipeline {0} has no version {1}")]
    VersionNotFound(Uuid, u32),

    #[error("invalid pipeline definition: {0}")]
    Invalid(#[from] DefinitionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Create a new pipeline at version 1
pub async fn create_pipeline(store: &dyn Store, req: CreatePipeline) -> Result<PipelineDefinition> {
    let definition = PipelineDefinition::new(req.name, req.stages);
    definition.validate()?;

    store.insert_definition(&definition).await?;

    tracing::info!("Pipeline created: {} ({})", definition.name, definition.id);

    Ok(definition)
}

/// Get the latest version of a pipeline
pub async fn get_pipeline(store: &dyn Store, id: Uuid) -> Result<PipelineDefinition> {
    store
        .latest_definition(id)
        .await?
        .ok_or(PipelineError::NotFound(id))
}

pub async fn get_pipeline_version(
    store: &dyn Store,
    id: Uuid,
    version: u32,
) -> Result<PipelineDefinition> {
    store
        .definition_version(id, version)
        .await?
        .ok_or(PipelineError::VersionNotFound(id, version))
}

/// List all pipelines
pub async fn list_pipelines(store: &dyn Store) -> Result<Vec<PipelineSummary>> {
    let definitions = store.list_latest_definitions().await?;
    Ok(definitions.into_iter().map(PipelineSummary::from).collect())
}

/// Replace a pipeline's stages, restarting its running executions
pub async fn redefine_pipeline(
    orchestrator: &Arc<Orchestrator>,
    id: Uuid,
    req: RedefinePipeline,
) -> orchestrator::Result<PipelineDefinition> {
    orchestrator.redefine(id, req.stages).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;
    use gantry_core::domain::pipeline::{DeployConfig, StageDescriptor, StageKind};

    fn deploy(name: &str) -> StageDescriptor {
        StageDescriptor {
            name: name.to_string(),
            kind: StageKind::Deploy(DeployConfig {
                fleet: "web".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_pipeline() {
        let store = InMemoryStore::new();

        let created = create_pipeline(
            &store,
            CreatePipeline {
                name: "web".to_string(),
                stages: vec![deploy("Deploy")],
            },
        )
        .await
        .unwrap();

        assert_eq!(created.version, 1);
        let fetched = get_pipeline(&store, created.id).await.unwrap();
        assert_eq!(fetched, created);
        let versioned = get_pipeline_version(&store, created.id, 1).await.unwrap();
        assert_eq!(versioned, created);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_definition() {
        let store = InMemoryStore::new();

        let result = create_pipeline(
            &store,
            CreatePipeline {
                name: "  ".to_string(),
                stages: vec![deploy("Deploy")],
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(PipelineError::Invalid(DefinitionError::BlankName))
        ));
        assert!(list_pipelines(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_pipeline_and_version() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();

        assert!(matches!(
            get_pipeline(&store, id).await,
            Err(PipelineError::NotFound(_))
        ));
        assert!(matches!(
            get_pipeline_version(&store, id, 3).await,
            Err(PipelineError::VersionNotFound(_, 3))
        ));
    }

    #[tokio::test]
    async fn test_list_returns_latest_versions() {
        let store = InMemoryStore::new();
        let created = create_pipeline(
            &store,
            CreatePipeline {
                name: "web".to_string(),
                stages: vec![deploy("Deploy")],
            },
        )
        .await
        .unwrap();
        store
            .insert_definition(&created.redefined(vec![deploy("Deploy"), deploy("Deploy-eu")]))
            .await
            .unwrap();

        let summaries = list_pipelines(&store).await.unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].version, 2);
        assert_eq!(summaries[0].stage_names, vec!["Deploy", "Deploy-eu"]);
    }
}
