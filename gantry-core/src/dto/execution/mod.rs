//! Execution DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::{Execution, ExecutionStatus};

/// Request to start an execution of a pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartExecution {
    /// Ref to build instead of the source stage's configured branch
    #[serde(default)]
    pub git_ref: Option<String>,
}

/// Execution summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub pipeline_version: u32,
    pub status: ExecutionStatus,
    pub current_stage: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure kind, e.g. `BuildFailed`
    pub failure: Option<String>,
}

impl From<Execution> for ExecutionSummary {
    fn from(execution: Execution) -> Self {
        Self {
            id: execution.id,
            pipeline_id: execution.pipeline_id,
            pipeline_version: execution.pipeline_version,
            status: execution.status,
            current_stage: execution.stages.last().map(|s| s.name.clone()),
            started_at: execution.started_at,
            finished_at: execution.finished_at,
            failure: execution.failure.map(|f| f.reason.kind().to_string()),
        }
    }
}
