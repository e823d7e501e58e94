//! Execution API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use gantry_core::domain::execution::Execution;
use gantry_core::dto::execution::ExecutionSummary;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// GET /execution/{id}
/// Full execution record with its stage history
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Execution>> {
    tracing::debug!("Getting execution: {}", id);

    let execution = state.orchestrator.get_status(id).await?;

    Ok(Json(execution))
}

/// POST /execution/{id}/cancel
pub async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Execution>> {
    tracing::info!("Cancelling execution: {}", id);

    let execution = state.orchestrator.cancel(id).await?;

    Ok(Json(execution))
}

/// GET /execution/pipeline/{pipeline_id}
/// Executions of a pipeline, newest first
pub async fn list_executions_by_pipeline(
    State(state): State<AppState>,
    Path(pipeline_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ExecutionSummary>>> {
    let executions = state.orchestrator.list_executions(pipeline_id).await?;

    Ok(Json(
        executions.into_iter().map(ExecutionSummary::from).collect(),
    ))
}
