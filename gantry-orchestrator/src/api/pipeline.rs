//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline management.

use axum::{
    Json,
    extract::{Path, State},
};
use gantry_core::domain::execution::{Execution, Trigger};
use gantry_core::domain::pipeline::PipelineDefinition;
use gantry_core::dto::execution::StartExecution;
use gantry_core::dto::pipeline::{CreatePipeline, PipelineSummary, RedefinePipeline};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::pipeline_service;

/// POST /pipeline/create
/// Create a new pipeline
pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(req): Json<CreatePipeline>,
) -> ApiResult<Json<PipelineDefinition>> {
    tracing::info!("Creating pipeline: {}", req.name);

    let pipeline = pipeline_service::create_pipeline(state.store.as_ref(), req).await?;

    Ok(Json(pipeline))
}

/// GET /pipeline/list
/// List all pipelines
pub async fn list_pipelines(State(state): State<AppState>) -> ApiResult<Json<Vec<PipelineSummary>>> {
    tracing::debug!("Listing all pipelines");

    let pipelines = pipeline_service::list_pipelines(state.store.as_ref()).await?;

    Ok(Json(pipelines))
}

/// GET /pipeline/{id}
/// Latest version of a pipeline
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineDefinition>> {
    tracing::debug!("Getting pipeline: {}", id);

    let pipeline = pipeline_service::get_pipeline(state.store.as_ref(), id).await?;

    Ok(Json(pipeline))
}

/// GET /pipeline/{id}/version/{version}
pub async fn get_pipeline_version(
    State(state): State<AppState>,
    Path((id, version)): Path<(Uuid, u32)>,
) -> ApiResult<Json<PipelineDefinition>> {
    let pipeline = pipeline_service::get_pipeline_version(state.store.as_ref(), id, version).await?;

    Ok(Json(pipeline))
}

/// PUT /pipeline/{id}
/// Store a new version; running executions restart on it
pub async fn redefine_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RedefinePipeline>,
) -> ApiResult<Json<PipelineDefinition>> {
    tracing::info!("Redefining pipeline: {}", id);

    let pipeline = pipeline_service::redefine_pipeline(&state.orchestrator, id, req).await?;

    Ok(Json(pipeline))
}

/// POST /pipeline/{id}/start
/// Start an execution of the latest version
pub async fn start_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StartExecution>,
) -> ApiResult<Json<Execution>> {
    tracing::info!("Starting pipeline: {}", id);

    let trigger = Trigger::Manual {
        git_ref: req.git_ref,
    };
    let execution_id = state.orchestrator.launch(id, trigger).await?;
    let execution = state.orchestrator.get_status(execution_id).await?;

    Ok(Json(execution))
}
