//! Pipeline-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use gantry_core::domain::execution::Execution;
use gantry_core::domain::pipeline::PipelineDefinition;
use gantry_core::dto::execution::StartExecution;
use gantry_core::dto::pipeline::{CreatePipeline, PipelineSummary, RedefinePipeline};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Pipeline Management
    // =============================================================================

    /// Create a new pipeline
    ///
    /// # Returns
    /// The stored definition, at version 1
    pub async fn create_pipeline(&self, req: CreatePipeline) -> Result<PipelineDefinition> {
        let response = self
            .client
            .post(self.url("/pipeline/create"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List the latest version of every pipeline
    pub async fn list_pipelines(&self) -> Result<Vec<PipelineSummary>> {
        let response = self.client.get(self.url("/pipeline/list")).send().await?;

        self.handle_response(response).await
    }

    /// Get the latest version of a pipeline
    pub async fn get_pipeline(&self, pipeline_id: Uuid) -> Result<PipelineDefinition> {
        let response = self
            .client
            .get(self.url(&format!("/pipeline/{}", pipeline_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get one stored version of a pipeline
    pub async fn get_pipeline_version(
        &self,
        pipeline_id: Uuid,
        version: u32,
    ) -> Result<PipelineDefinition> {
        let response = self
            .client
            .get(self.url(&format!("/pipeline/{}/version/{}", pipeline_id, version)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Replace a pipeline's stages
    ///
    /// Running executions of the pipeline are cancelled and restarted on the
    /// new version by the orchestrator.
    pub async fn redefine_pipeline(
        &self,
        pipeline_id: Uuid,
        req: RedefinePipeline,
    ) -> Result<PipelineDefinition> {
        let response = self
            .client
            .put(self.url(&format!("/pipeline/{}", pipeline_id)))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Start an execution of the latest version of a pipeline
    pub async fn start_pipeline(&self, pipeline_id: Uuid, req: StartExecution) -> Result<Execution> {
        let response = self
            .client
            .post(self.url(&format!("/pipeline/{}/start", pipeline_id)))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
