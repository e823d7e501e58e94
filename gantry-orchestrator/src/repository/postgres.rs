//! Postgres store
//!
//! Handles all database operations. Stage history, triggers and failure
//! details are stored as JSONB next to the indexed scalar columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_core::domain::approval::{ApprovalRequest, Decision};
use gantry_core::domain::execution::{Execution, ExecutionStatus};
use gantry_core::domain::pipeline::PipelineDefinition;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Pipeline definitions
    // =========================================================================

    async fn insert_definition(&self, definition: &PipelineDefinition) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO pipeline_versions (id, version, name, stages, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id, version) DO NOTHING
            "#,
        )
        .bind(definition.id)
        .bind(definition.version as i32)
        .bind(&definition.name)
        .bind(to_json(&definition.stages)?)
        .bind(definition.created_at)
        .bind(definition.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionExists {
                id: definition.id,
                version: definition.version,
            });
        }

        Ok(())
    }

    async fn latest_definition(&self, id: Uuid) -> StoreResult<Option<PipelineDefinition>> {
        let row = sqlx::query_as::<_, DefinitionRow>(
            r#"
            SELECT id, version, name, stages, created_at, updated_at
            FROM pipeline_versions
            WHERE id = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn definition_version(
        &self,
        id: Uuid,
        version: u32,
    ) -> StoreResult<Option<PipelineDefinition>> {
        let row = sqlx::query_as::<_, DefinitionRow>(
            r#"
            SELECT id, version, name, stages, created_at, updated_at
            FROM pipeline_versions
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(id)
        .bind(version as i32)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_latest_definitions(&self) -> StoreResult<Vec<PipelineDefinition>> {
        let rows = sqlx::query_as::<_, DefinitionRow>(
            r#"
            SELECT * FROM (
                SELECT DISTINCT ON (id) id, version, name, stages, created_at, updated_at
                FROM pipeline_versions
                ORDER BY id, version DESC
            ) latest
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    // =========================================================================
    // Executions
    // =========================================================================

    async fn insert_execution(&self, execution: &Execution) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO executions (
                id, pipeline_id, pipeline_version, trigger, status, current_stage_index,
                started_at, finished_at, stages, failure
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(execution.id)
        .bind(execution.pipeline_id)
        .bind(execution.pipeline_version as i32)
        .bind(to_json(&execution.trigger)?)
        .bind(execution_status_to_string(execution.status))
        .bind(execution.current_stage_index as i32)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(to_json(&execution.stages)?)
        .bind(execution.failure.as_ref().map(to_json).transpose()?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_execution(&self, execution: &Execution) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE executions
            SET status = $1, current_stage_index = $2, finished_at = $3, stages = $4, failure = $5
            WHERE id = $6
            "#,
        )
        .bind(execution_status_to_string(execution.status))
        .bind(execution.current_stage_index as i32)
        .bind(execution.finished_at)
        .bind(to_json(&execution.stages)?)
        .bind(execution.failure.as_ref().map(to_json).transpose()?)
        .bind(execution.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> StoreResult<Option<Execution>> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT id, pipeline_id, pipeline_version, trigger, status, current_stage_index,
                   started_at, finished_at, stages, failure
            FROM executions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_executions(&self, pipeline_id: Uuid) -> StoreResult<Vec<Execution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT id, pipeline_id, pipeline_version, trigger, status, current_stage_index,
                   started_at, finished_at, stages, failure
            FROM executions
            WHERE pipeline_id = $1
            ORDER BY started_at DESC
            "#,
        )
        .bind(pipeline_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_executions_by_status(
        &self,
        status: ExecutionStatus,
    ) -> StoreResult<Vec<Execution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT id, pipeline_id, pipeline_version, trigger, status, current_stage_index,
                   started_at, finished_at, stages, failure
            FROM executions
            WHERE status = $1
            ORDER BY started_at ASC
            "#,
        )
        .bind(execution_status_to_string(status))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    // =========================================================================
    // Approval requests
    // =========================================================================

    async fn insert_approval(&self, request: &ApprovalRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO approvals (
                id, execution_id, stage_index, stage_name, artifact_id,
                notified_at, decision, decided_by, decided_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(request.id)
        .bind(request.execution_id)
        .bind(request.stage_index as i32)
        .bind(&request.stage_name)
        .bind(request.artifact_id)
        .bind(request.notified_at)
        .bind(decision_to_string(request.decision))
        .bind(&request.decided_by)
        .bind(request.decided_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_approval(&self, request: &ApprovalRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE approvals
            SET decision = $1, decided_by = $2, decided_at = $3
            WHERE id = $4
            "#,
        )
        .bind(decision_to_string(request.decision))
        .bind(&request.decided_by)
        .bind(request.decided_at)
        .bind(request.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_approval(&self, id: Uuid) -> StoreResult<Option<ApprovalRequest>> {
        let row = sqlx::query_as::<_, ApprovalRow>(
            r#"
            SELECT id, execution_id, stage_index, stage_name, artifact_id,
                   notified_at, decision, decided_by, decided_at
            FROM approvals
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_approvals(&self, decision: Decision) -> StoreResult<Vec<ApprovalRequest>> {
        let rows = sqlx::query_as::<_, ApprovalRow>(
            r#"
            SELECT id, execution_id, stage_index, stage_name, artifact_id,
                   notified_at, decision, decided_by, decided_at
            FROM approvals
            WHERE decision = $1
            ORDER BY notified_at ASC
            "#,
        )
        .bind(decision_to_string(decision))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_approvals_for_execution(
        &self,
        execution_id: Uuid,
    ) -> StoreResult<Vec<ApprovalRequest>> {
        let rows = sqlx::query_as::<_, ApprovalRow>(
            r#"
            SELECT id, execution_id, stage_index, stage_name, artifact_id,
                   notified_at, decision, decided_by, decided_at
            FROM approvals
            WHERE execution_id = $1
            ORDER BY stage_index ASC
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> StoreResult<T> {
    serde_json::from_value(value).map_err(|e| StoreError::Corrupt(format!("{}: {}", what, e)))
}

fn execution_status_to_string(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Running => "Running",
        ExecutionStatus::Succeeded => "Succeeded",
        ExecutionStatus::Failed => "Failed",
        ExecutionStatus::Cancelled => "Cancelled",
    }
}

fn string_to_execution_status(s: &str) -> StoreResult<ExecutionStatus> {
    match s {
        "Running" => Ok(ExecutionStatus::Running),
        "Succeeded" => Ok(ExecutionStatus::Succeeded),
        "Failed" => Ok(ExecutionStatus::Failed),
        "Cancelled" => Ok(ExecutionStatus::Cancelled),
        other => Err(StoreError::Corrupt(format!(
            "unknown execution status '{}'",
            other
        ))),
    }
}

fn decision_to_string(decision: Decision) -> &'static str {
    match decision {
        Decision::Pending => "Pending",
        Decision::Approved => "Approved",
        Decision::Rejected => "Rejected",
        Decision::TimedOut => "TimedOut",
        Decision::Superseded => "Superseded",
    }
}

fn string_to_decision(s: &str) -> StoreResult<Decision> {
    match s {
        "Pending" => Ok(Decision::Pending),
        "Approved" => Ok(Decision::Approved),
        "Rejected" => Ok(Decision::Rejected),
        "TimedOut" => Ok(Decision::TimedOut),
        "Superseded" => Ok(Decision::Superseded),
        other => Err(StoreError::Corrupt(format!("unknown decision '{}'", other))),
    }
}

fn non_negative(value: i32, what: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {}: {}", what, value)))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct DefinitionRow {
    id: Uuid,
    version: i32,
    name: String,
    stages: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DefinitionRow> for PipelineDefinition {
    type Error = StoreError;

    fn try_from(row: DefinitionRow) -> StoreResult<Self> {
        Ok(PipelineDefinition {
            id: row.id,
            version: non_negative(row.version, "version")?,
            name: row.name,
            stages: from_json(row.stages, "stages")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: Uuid,
    pipeline_id: Uuid,
    pipeline_version: i32,
    trigger: serde_json::Value,
    status: String,
    current_stage_index: i32,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    stages: serde_json::Value,
    failure: Option<serde_json::Value>,
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> StoreResult<Self> {
        Ok(Execution {
            id: row.id,
            pipeline_id: row.pipeline_id,
            pipeline_version: non_negative(row.pipeline_version, "pipeline_version")?,
            trigger: from_json(row.trigger, "trigger")?,
            status: string_to_execution_status(&row.status)?,
            current_stage_index: non_negative(row.current_stage_index, "current_stage_index")?
                as usize,
            started_at: row.started_at,
            finished_at: row.finished_at,
            stages: from_json(row.stages, "stages")?,
            failure: row.failure.map(|f| from_json(f, "failure")).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ApprovalRow {
    id: Uuid,
    execution_id: Uuid,
    stage_index: i32,
    stage_name: String,
    artifact_id: Option<Uuid>,
    notified_at: DateTime<Utc>,
    decision: String,
    decided_by: Option<String>,
    decided_at: Option<DateTime<Utc>>,
}

impl TryFrom<ApprovalRow> for ApprovalRequest {
    type Error = StoreError;

    fn try_from(row: ApprovalRow) -> StoreResult<Self> {
        Ok(ApprovalRequest {
            id: row.id,
            execution_id: row.execution_id,
            stage_index: non_negative(row.stage_index, "stage_index")? as usize,
            stage_name: row.stage_name,
            artifact_id: row.artifact_id,
            notified_at: row.notified_at,
            decision: string_to_decision(&row.decision)?,
            decided_by: row.decided_by,
            decided_at: row.decided_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_round_trip() {
        for status in [
            ExecutionStatus::Running,
            ExecutionStatus::Succeeded,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
        ] {
            let s = execution_status_to_string(status);
            assert_eq!(string_to_execution_status(s).unwrap(), status);
        }
        assert!(string_to_execution_status("Queued").is_err());
    }

    #[test]
    fn test_unknown_decision_is_corrupt() {
        assert!(matches!(
            string_to_decision("Maybe"),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_negative_index_is_corrupt() {
        assert!(non_negative(-1, "stage_index").is_err());
        assert_eq!(non_negative(3, "stage_index").unwrap(), 3);
    }
}
