//! In-memory store
//!
//! Keeps everything in process memory. Used when no database is configured
//! and by the test suite.

use async_trait::async_trait;
use gantry_core::domain::approval::{ApprovalRequest, Decision};
use gantry_core::domain::execution::{Execution, ExecutionStatus};
use gantry_core::domain::pipeline::PipelineDefinition;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};

#[derive(Default)]
pub struct InMemoryStore {
    /// pipeline id -> version -> definition
    definitions: RwLock<HashMap<Uuid, BTreeMap<u32, PipelineDefinition>>>,
    executions: RwLock<HashMap<Uuid, Execution>>,
    approvals: RwLock<HashMap<Uuid, ApprovalRequest>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_definition(&self, definition: &PipelineDefinition) -> StoreResult<()> {
        let mut definitions = self.definitions.write().await;
        match definitions.entry(definition.id).or_default().entry(definition.version) {
            Entry::Vacant(slot) => {
                slot.insert(definition.clone());
                Ok(())
            }
            Entry::Occupied(_) => Err(StoreError::VersionExists {
                id: definition.id,
                version: definition.version,
            }),
        }
    }

    async fn latest_definition(&self, id: Uuid) -> StoreResult<Option<PipelineDefinition>> {
        let definitions = self.definitions.read().await;
        Ok(definitions
            .get(&id)
            .and_then(|versions| versions.values().next_back().cloned()))
    }

    async fn definition_version(
        &self,
        id: Uuid,
        version: u32,
    ) -> StoreResult<Option<PipelineDefinition>> {
        let definitions = self.definitions.read().await;
        Ok(definitions
            .get(&id)
            .and_then(|versions| versions.get(&version).cloned()))
    }

    async fn list_latest_definitions(&self) -> StoreResult<Vec<PipelineDefinition>> {
        let definitions = self.definitions.read().await;
        let mut latest: Vec<PipelineDefinition> = definitions
            .values()
            .filter_map(|versions| versions.values().next_back().cloned())
            .collect();
        latest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(latest)
    }

    async fn insert_execution(&self, execution: &Execution) -> StoreResult<()> {
        let mut executions = self.executions.write().await;
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &Execution) -> StoreResult<()> {
        let mut executions = self.executions.write().await;
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> StoreResult<Option<Execution>> {
        let executions = self.executions.read().await;
        Ok(executions.get(&id).cloned())
    }

    async fn list_executions(&self, pipeline_id: Uuid) -> StoreResult<Vec<Execution>> {
        let executions = self.executions.read().await;
        let mut matching: Vec<Execution> = executions
            .values()
            .filter(|e| e.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(matching)
    }

    async fn list_executions_by_status(
        &self,
        status: ExecutionStatus,
    ) -> StoreResult<Vec<Execution>> {
        let executions = self.executions.read().await;
        let mut matching: Vec<Execution> = executions
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(matching)
    }

    async fn insert_approval(&self, request: &ApprovalRequest) -> StoreResult<()> {
        let mut approvals = self.approvals.write().await;
        approvals.insert(request.id, request.clone());
        Ok(())
    }

    async fn update_approval(&self, request: &ApprovalRequest) -> StoreResult<()> {
        let mut approvals = self.approvals.write().await;
        approvals.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_approval(&self, id: Uuid) -> StoreResult<Option<ApprovalRequest>> {
        let approvals = self.approvals.read().await;
        Ok(approvals.get(&id).cloned())
    }

    async fn list_approvals(&self, decision: Decision) -> StoreResult<Vec<ApprovalRequest>> {
        let approvals = self.approvals.read().await;
        let mut matching: Vec<ApprovalRequest> = approvals
            .values()
            .filter(|a| a.decision == decision)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.notified_at.cmp(&b.notified_at));
        Ok(matching)
    }

    async fn list_approvals_for_execution(
        &self,
        execution_id: Uuid,
    ) -> StoreResult<Vec<ApprovalRequest>> {
        let approvals = self.approvals.read().await;
        let mut matching: Vec<ApprovalRequest> = approvals
            .values()
            .filter(|a| a.execution_id == execution_id)
            .cloned()
            .collect();
        matching.sort_by_key(|a| a.stage_index);
        Ok(matching)
    }
}
