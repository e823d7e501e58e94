//! Execution-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use gantry_core::domain::execution::Execution;
use gantry_core::dto::execution::ExecutionSummary;
use uuid::Uuid;

impl OrchestratorClient {
    /// Get an execution with its stage history
    pub async fn get_execution(&self, execution_id: Uuid) -> Result<Execution> {
        let response = self
            .client
            .get(self.url(&format!("/execution/{}", execution_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Cancel a running execution
    pub async fn cancel_execution(&self, execution_id: Uuid) -> Result<Execution> {
        let response = self
            .client
            .post(self.url(&format!("/execution/{}/cancel", execution_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Executions of a pipeline, newest first
    pub async fn list_executions(&self, pipeline_id: Uuid) -> Result<Vec<ExecutionSummary>> {
        let response = self
            .client
            .get(self.url(&format!("/execution/pipeline/{}", pipeline_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }
}
