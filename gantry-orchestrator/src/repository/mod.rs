//! Repository Module
//!
//! Persistence layer for the orchestrator.
//! Pipeline definitions (every version), executions with their stage history,
//! and approval requests are kept for auditability. `PgStore` backs a real
//! deployment; `InMemoryStore` serves development runs and tests.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use gantry_core::domain::approval::{ApprovalRequest, Decision};
use gantry_core::domain::execution::{Execution, ExecutionStatus};
use gantry_core::domain::pipeline::PipelineDefinition;
use thiserror::Error;
use uuid::Uuid;

/// Storage error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored record could not be decoded
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The definition version already exists
    #[error("pipeline {id} already has a version {version}")]
    VersionExists { id: Uuid, version: u32 },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence interface used by the services
#[async_trait]
pub trait Store: Send + Sync {
    // Pipeline definitions

    /// Stores a definition version
    ///
    /// Versions are never overwritten: inserting an existing `(id, version)`
    /// fails with [`StoreError::VersionExists`].
    async fn insert_definition(&self, definition: &PipelineDefinition) -> StoreResult<()>;

    /// Highest stored version of a pipeline
    async fn latest_definition(&self, id: Uuid) -> StoreResult<Option<PipelineDefinition>>;

    async fn definition_version(
        &self,
        id: Uuid,
        version: u32,
    ) -> StoreResult<Option<PipelineDefinition>>;

    /// Latest version of every pipeline
    async fn list_latest_definitions(&self) -> StoreResult<Vec<PipelineDefinition>>;

    // Executions

    async fn insert_execution(&self, execution: &Execution) -> StoreResult<()>;

    /// Replaces the stored record with `execution`
    async fn update_execution(&self, execution: &Execution) -> StoreResult<()>;

    async fn get_execution(&self, id: Uuid) -> StoreResult<Option<Execution>>;

    /// Executions of a pipeline, newest first
    async fn list_executions(&self, pipeline_id: Uuid) -> StoreResult<Vec<Execution>>;

    /// Executions of every pipeline in a given state, oldest first
    async fn list_executions_by_status(
        &self,
        status: ExecutionStatus,
    ) -> StoreResult<Vec<Execution>>;

    // Approval requests

    async fn insert_approval(&self, request: &ApprovalRequest) -> StoreResult<()>;

    async fn update_approval(&self, request: &ApprovalRequest) -> StoreResult<()>;

    async fn get_approval(&self, id: Uuid) -> StoreResult<Option<ApprovalRequest>>;

    /// Approval requests in a given state, oldest first
    async fn list_approvals(&self, decision: Decision) -> StoreResult<Vec<ApprovalRequest>>;

    async fn list_approvals_for_execution(
        &self,
        execution_id: Uuid,
    ) -> StoreResult<Vec<ApprovalRequest>>;
}
