//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod approval;
pub mod error;
pub mod execution;
pub mod health;
pub mod pipeline;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::repository::Store;
use crate::service::Orchestrator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            store: orchestrator.store().clone(),
            orchestrator,
        }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/pipeline/create", post(pipeline::create_pipeline))
        .route("/pipeline/list", get(pipeline::list_pipelines))
        .route(
            "/pipeline/{id}",
            get(pipeline::get_pipeline).put(pipeline::redefine_pipeline),
        )
        .route(
            "/pipeline/{id}/version/{version}",
            get(pipeline::get_pipeline_version),
        )
        .route("/pipeline/{id}/start", post(pipeline::start_pipeline))
        // Execution endpoints
        .route("/execution/{id}", get(execution::get_execution))
        .route("/execution/{id}/cancel", post(execution::cancel_execution))
        .route(
            "/execution/pipeline/{pipeline_id}",
            get(execution::list_executions_by_pipeline),
        )
        // Approval endpoints
        .route("/approval/pending", get(approval::list_pending_approvals))
        .route("/approval/{id}", get(approval::get_approval))
        .route("/approval/{id}/decide", post(approval::decide))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
