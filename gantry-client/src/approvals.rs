//! Approval-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use gantry_core::domain::approval::{ApprovalRequest, Verdict};
use gantry_core::dto::approval::SubmitDecision;
use uuid::Uuid;

impl OrchestratorClient {
    /// Approval requests still waiting for a decision, oldest first
    pub async fn list_pending_approvals(&self) -> Result<Vec<ApprovalRequest>> {
        let response = self.client.get(self.url("/approval/pending")).send().await?;

        self.handle_response(response).await
    }

    pub async fn get_approval(&self, approval_id: Uuid) -> Result<ApprovalRequest> {
        let response = self
            .client
            .get(self.url(&format!("/approval/{}", approval_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Submit a decision
    ///
    /// A request that was already decided, timed out or superseded yields an
    /// error for which [`ClientError::is_conflict`](crate::ClientError::is_conflict)
    /// is true.
    pub async fn decide(
        &self,
        approval_id: Uuid,
        verdict: Verdict,
        decider: &str,
    ) -> Result<ApprovalRequest> {
        let req = SubmitDecision {
            verdict,
            decider: decider.to_string(),
        };
        let response = self
            .client
            .post(self.url(&format!("/approval/{}/decide", approval_id)))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
