//! Approval API Handlers
//!
//! Status queries plus the decision entry point for approval gates.

use axum::{
    Json,
    extract::{Path, State},
};
use gantry_core::domain::approval::ApprovalRequest;
use gantry_core::dto::approval::SubmitDecision;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// GET /approval/pending
pub async fn list_pending_approvals(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ApprovalRequest>>> {
    let pending = state.orchestrator.list_pending_approvals().await?;

    Ok(Json(pending))
}

/// GET /approval/{id}
pub async fn get_approval(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApprovalRequest>> {
    let request = state.orchestrator.get_approval(id).await?;

    Ok(Json(request))
}

/// POST /approval/{id}/decide
/// Approve or reject a pending request; stale decisions answer 409
pub async fn decide(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitDecision>,
) -> ApiResult<Json<ApprovalRequest>> {
    if req.decider.trim().is_empty() {
        return Err(ApiError::BadRequest("decider cannot be empty".to_string()));
    }

    tracing::info!("Decision {:?} for approval {} by {}", req.verdict, id, req.decider);

    let request = state
        .orchestrator
        .decide(id, req.verdict, &req.decider)
        .await?;

    Ok(Json(request))
}
