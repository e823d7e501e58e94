//! Health Check API Handler
//!
//! Reports liveness plus how many approvals are waiting on a human.

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::api::AppState;
use crate::api::error::ApiResult;

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let pending = state.orchestrator.list_pending_approvals().await?;

    Ok(Json(json!({
        "status": "ok",
        "pending_approvals": pending.len(),
    })))
}
