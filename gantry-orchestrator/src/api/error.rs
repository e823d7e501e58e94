//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::repository::StoreError;
use crate::service::OrchestratorError;
use crate::service::pipeline_service::PipelineError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    StoreError(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::StoreError(err) => {
                tracing::error!("Store error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionExists { .. } => ApiError::Conflict(err.to_string()),
            err => ApiError::StoreError(err),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::PipelineNotFound(_)
            | OrchestratorError::ExecutionNotFound(_)
            | OrchestratorError::ApprovalNotFound(_) => ApiError::NotFound(err.to_string()),
            OrchestratorError::InvalidDefinition(_) | OrchestratorError::InvalidState(_) => {
                ApiError::BadRequest(err.to_string())
            }
            OrchestratorError::StaleDecision(_)
            | OrchestratorError::AlreadyRunning { .. }
            | OrchestratorError::VersionConflict { .. } => ApiError::Conflict(err.to_string()),
            OrchestratorError::Store(e) => e.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(_) | PipelineError::VersionNotFound(..) => {
                ApiError::NotFound(err.to_string())
            }
            PipelineError::Invalid(_) => ApiError::BadRequest(err.to_string()),
            PipelineError::Store(e) => e.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::domain::pipeline::DefinitionError;
    use uuid::Uuid;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_orchestrator_errors_map_to_status_codes() {
        let id = Uuid::new_v4();

        assert_eq!(
            status_of(OrchestratorError::ExecutionNotFound(id)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(OrchestratorError::ApprovalNotFound(id)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(OrchestratorError::InvalidDefinition(DefinitionError::NoStages)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(OrchestratorError::InvalidState("done".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(OrchestratorError::StaleDecision(id)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrchestratorError::AlreadyRunning {
                pipeline_id: id,
                execution_id: Uuid::new_v4(),
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrchestratorError::VersionConflict {
                pipeline_id: id,
                version: 2,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrchestratorError::Store(StoreError::VersionExists { id, version: 2 })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrchestratorError::Store(StoreError::Corrupt("x".to_string()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_pipeline_errors_map_to_status_codes() {
        let id = Uuid::new_v4();

        assert_eq!(status_of(PipelineError::NotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(PipelineError::VersionNotFound(id, 2)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(PipelineError::Invalid(DefinitionError::BlankName)),
            StatusCode::BAD_REQUEST
        );
    }
}
