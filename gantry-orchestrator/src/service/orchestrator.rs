//! Pipeline Orchestrator
//!
//! Sequences the stages of an execution, hands each stage the most recent
//! artifact, and records every transition. Each execution is driven by its
//! own spawned task; the orchestrator itself only tracks which executions are
//! active and how to signal them.
//!
//! All status changes of an execution go through `transition`, which holds
//! the `active` lock while it reads, modifies and writes the record. A stage
//! result that arrives after a cancel therefore finds the execution terminal
//! and is dropped.
//!
//! A pipeline has at most one active execution. Redefinition is the only
//! path that replaces one, and it cancels the old run before starting the new.

use gantry_core::domain::approval::{ApprovalRequest, Decision, Verdict};
use gantry_core::domain::artifact::Artifact;
use gantry_core::domain::execution::{Execution, ExecutionStatus, Trigger};
use gantry_core::domain::failure::StageFailure;
use gantry_core::domain::pipeline::{
    DefinitionError, PipelineDefinition, StageDescriptor, validate_stages,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ports::Collaborators;
use crate::repository::{Store, StoreError, StoreResult};
use crate::stage::{DecisionError, StageContext, Stages};

/// Orchestrator error type
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid pipeline definition: {0}")]
    InvalidDefinition(#[from] DefinitionError),

    #[error("approval {0} is no longer pending")]
    StaleDecision(Uuid),

    #[error("pipeline {0} not found")]
    PipelineNotFound(Uuid),

    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("approval {0} not found")]
    ApprovalNotFound(Uuid),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("pipeline {pipeline_id} is already running as execution {execution_id}")]
    AlreadyRunning { pipeline_id: Uuid, execution_id: Uuid },

    #[error("pipeline {pipeline_id} v{version} was defined concurrently")]
    VersionConflict { pipeline_id: Uuid, version: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

struct ActiveExecution {
    pipeline_id: Uuid,
    cancel: watch::Sender<bool>,
}

/// What `recover` settled
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Recovery {
    pub failed_executions: usize,
    pub superseded_approvals: usize,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    stages: Stages,
    active: Mutex<HashMap<Uuid, ActiveExecution>>,
    /// Serializes read-latest / insert-next of pipeline versions
    redefinitions: Mutex<()>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>, collaborators: Collaborators, project: String) -> Arc<Self> {
        Arc::new(Self {
            stages: Stages::new(collaborators, store.clone(), project),
            store,
            active: Mutex::new(HashMap::new()),
            redefinitions: Mutex::new(()),
        })
    }

    /// Settles state left behind by a previous orchestrator process
    ///
    /// Executions still marked running are failed and pending approval
    /// requests without a live gate are superseded; nothing can resume them.
    pub async fn recover(&self) -> Result<Recovery> {
        let mut recovery = Recovery::default();

        {
            let active = self.active.lock().await;
            let running = self
                .store
                .list_executions_by_status(ExecutionStatus::Running)
                .await?;

            for mut execution in running {
                if active.contains_key(&execution.id) {
                    continue;
                }
                execution.fail_stage(StageFailure::Internal {
                    reason: "orchestrator restarted".to_string(),
                });
                self.store.update_execution(&execution).await?;
                warn!("Execution {} was running at shutdown, marked failed", execution.id);
                recovery.failed_executions += 1;
            }
        }

        recovery.superseded_approvals = self.stages.approval().supersede_orphaned().await?;

        Ok(recovery)
    }

    /// Validates `definition` and starts driving a new execution of it
    ///
    /// The definition version is stored first if it is not known yet. When it
    /// is, the stored version runs. Fails with `AlreadyRunning` while another
    /// execution of the pipeline is active.
    pub async fn start(
        self: &Arc<Self>,
        definition: &PipelineDefinition,
        trigger: Trigger,
    ) -> Result<Uuid> {
        definition.validate()?;
        let definition = self.stored_version(definition).await?;

        let execution = Execution::new(definition.id, definition.version, trigger);
        let execution_id = execution.id;
        let (cancel_tx, cancel_rx) = watch::channel(false);

        {
            let mut active = self.active.lock().await;
            if let Some((running, _)) = active
                .iter()
                .find(|(_, entry)| entry.pipeline_id == definition.id)
            {
                return Err(OrchestratorError::AlreadyRunning {
                    pipeline_id: definition.id,
                    execution_id: *running,
                });
            }
            self.store.insert_execution(&execution).await?;
            active.insert(
                execution_id,
                ActiveExecution {
                    pipeline_id: definition.id,
                    cancel: cancel_tx,
                },
            );
        }

        info!(
            "Execution {} started for pipeline '{}' v{}",
            execution_id, definition.name, definition.version
        );

        let driver = Arc::clone(self);
        tokio::spawn(driver.drive(definition, execution, cancel_rx));

        Ok(execution_id)
    }

    /// Starts the latest version of a stored pipeline
    pub async fn launch(self: &Arc<Self>, pipeline_id: Uuid, trigger: Trigger) -> Result<Uuid> {
        let definition = self
            .store
            .latest_definition(pipeline_id)
            .await?
            .ok_or(OrchestratorError::PipelineNotFound(pipeline_id))?;

        self.start(&definition, trigger).await
    }

    pub async fn get_status(&self, execution_id: Uuid) -> Result<Execution> {
        self.store
            .get_execution(execution_id)
            .await?
            .ok_or(OrchestratorError::ExecutionNotFound(execution_id))
    }

    /// Cancels a running execution and abandons its in-flight stage
    pub async fn cancel(&self, execution_id: Uuid) -> Result<Execution> {
        let mut active = self.active.lock().await;

        let mut execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or(OrchestratorError::ExecutionNotFound(execution_id))?;

        if execution.status.is_terminal() {
            return Err(OrchestratorError::InvalidState(format!(
                "execution {} is already {}",
                execution_id, execution.status
            )));
        }

        execution.cancel();
        self.store.update_execution(&execution).await?;

        if let Some(entry) = active.remove(&execution_id) {
            let _ = entry.cancel.send(true);
        }
        // Also closes requests persisted by an earlier process
        self.stages.approval().supersede(execution_id).await;

        info!("Execution {} cancelled", execution_id);
        Ok(execution)
    }

    /// Stores a new version of a pipeline and restarts its running executions on it
    pub async fn redefine(
        self: &Arc<Self>,
        pipeline_id: Uuid,
        stages: Vec<StageDescriptor>,
    ) -> Result<PipelineDefinition> {
        validate_stages(&stages)?;

        let _serial = self.redefinitions.lock().await;

        let current = self
            .store
            .latest_definition(pipeline_id)
            .await?
            .ok_or(OrchestratorError::PipelineNotFound(pipeline_id))?;

        let next = current.redefined(stages);
        match self.store.insert_definition(&next).await {
            Ok(()) => {}
            Err(StoreError::VersionExists { id, version }) => {
                return Err(OrchestratorError::VersionConflict {
                    pipeline_id: id,
                    version,
                });
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            "Pipeline '{}' redefined: v{} -> v{}",
            next.name, current.version, next.version
        );

        for execution_id in self.running_executions(pipeline_id).await {
            let cancelled = match self.cancel(execution_id).await {
                Ok(execution) => execution,
                // Finished on its own in the meantime
                Err(OrchestratorError::InvalidState(_)) => continue,
                Err(e) => return Err(e),
            };

            let restarted = match self.start(&next, cancelled.trigger).await {
                Ok(id) => id,
                // Another trigger already started the new version
                Err(OrchestratorError::AlreadyRunning { execution_id: other, .. }) => {
                    info!(
                        "Execution {} not restarted, {} already runs v{}",
                        execution_id, other, next.version
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            info!(
                "Execution {} restarted as {} on v{}",
                execution_id, restarted, next.version
            );
        }

        Ok(next)
    }

    /// Submits a human decision for a pending approval
    pub async fn decide(
        &self,
        approval_id: Uuid,
        verdict: Verdict,
        decider: &str,
    ) -> Result<ApprovalRequest> {
        self.stages
            .approval()
            .decide(approval_id, verdict, decider)
            .await
            .map_err(|e| match e {
                DecisionError::NotFound => OrchestratorError::ApprovalNotFound(approval_id),
                DecisionError::Stale => OrchestratorError::StaleDecision(approval_id),
                DecisionError::Store(e) => OrchestratorError::Store(e),
            })
    }

    /// Executions of a pipeline, newest first
    pub async fn list_executions(&self, pipeline_id: Uuid) -> Result<Vec<Execution>> {
        if self.store.latest_definition(pipeline_id).await?.is_none() {
            return Err(OrchestratorError::PipelineNotFound(pipeline_id));
        }
        Ok(self.store.list_executions(pipeline_id).await?)
    }

    pub async fn get_approval(&self, approval_id: Uuid) -> Result<ApprovalRequest> {
        self.store
            .get_approval(approval_id)
            .await?
            .ok_or(OrchestratorError::ApprovalNotFound(approval_id))
    }

    pub async fn list_pending_approvals(&self) -> Result<Vec<ApprovalRequest>> {
        Ok(self.store.list_approvals(Decision::Pending).await?)
    }

    /// Whether any execution of the pipeline is being driven right now
    pub async fn has_running(&self, pipeline_id: Uuid) -> bool {
        self.active
            .lock()
            .await
            .values()
            .any(|entry| entry.pipeline_id == pipeline_id)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The stored copy of `definition`'s version, inserting it if missing
    async fn stored_version(&self, definition: &PipelineDefinition) -> Result<PipelineDefinition> {
        let (id, version) = (definition.id, definition.version);

        if let Some(stored) = self.store.definition_version(id, version).await? {
            return Ok(stored);
        }

        match self.store.insert_definition(definition).await {
            Ok(()) => Ok(definition.clone()),
            // Inserted by someone else in the meantime
            Err(StoreError::VersionExists { .. }) => self
                .store
                .definition_version(id, version)
                .await?
                .ok_or(OrchestratorError::VersionConflict {
                    pipeline_id: id,
                    version,
                }),
            Err(e) => Err(e.into()),
        }
    }

    async fn running_executions(&self, pipeline_id: Uuid) -> Vec<Uuid> {
        self.active
            .lock()
            .await
            .iter()
            .filter(|(_, entry)| entry.pipeline_id == pipeline_id)
            .map(|(id, _)| *id)
            .collect()
    }

    async fn drive(
        self: Arc<Self>,
        definition: PipelineDefinition,
        execution: Execution,
        mut cancel: watch::Receiver<bool>,
    ) {
        let execution_id = execution.id;
        let last = definition.stages.len().saturating_sub(1);
        let mut input: Option<Artifact> = None;

        for (index, stage) in definition.stages.iter().enumerate() {
            match self
                .transition(execution_id, |e| e.begin_stage(index, &stage.name))
                .await
            {
                Ok(Some(_)) => {}
                Ok(None) => return,
                Err(e) => return self.abandon(execution_id, e).await,
            }

            let ctx = StageContext {
                execution_id,
                pipeline_name: definition.name.clone(),
                stage_index: index,
                stage_name: stage.name.clone(),
                trigger: execution.trigger.clone(),
            };

            let result = tokio::select! {
                result = self.stages.run(&ctx, &stage.kind, input.as_ref()) => result,
                _ = cancelled(&mut cancel) => {
                    info!(
                        "Execution {}: abandoned stage '{}' after cancel",
                        execution_id, stage.name
                    );
                    return;
                }
            };

            let recorded = match result {
                Ok(output) => {
                    if let Some(artifact) = &output.artifact {
                        input = Some(artifact.clone());
                    }
                    self.transition(execution_id, |e| {
                        e.complete_stage(output.artifact);
                        if index == last {
                            e.succeed();
                        }
                    })
                    .await
                }
                Err(failure) => {
                    warn!(
                        "Execution {}: stage '{}' failed: {}",
                        execution_id, stage.name, failure
                    );
                    self.transition(execution_id, |e| e.fail_stage(failure)).await
                }
            };

            match recorded {
                Ok(Some(execution)) if execution.status.is_terminal() => {
                    info!("Execution {} finished: {}", execution_id, execution.status);
                    return;
                }
                Ok(Some(_)) => {}
                Ok(None) => return,
                Err(e) => return self.abandon(execution_id, e).await,
            }
        }
    }

    /// Applies `apply` to a non-terminal execution under the transition lock
    ///
    /// Returns `None` when the execution is gone or already terminal.
    async fn transition<F>(&self, execution_id: Uuid, apply: F) -> StoreResult<Option<Execution>>
    where
        F: FnOnce(&mut Execution) + Send,
    {
        let mut active = self.active.lock().await;

        let mut execution = match self.store.get_execution(execution_id).await? {
            Some(execution) if !execution.status.is_terminal() => execution,
            _ => {
                active.remove(&execution_id);
                return Ok(None);
            }
        };

        apply(&mut execution);
        self.store.update_execution(&execution).await?;

        if execution.status.is_terminal() {
            active.remove(&execution_id);
        }
        Ok(Some(execution))
    }

    async fn abandon(&self, execution_id: Uuid, e: StoreError) {
        error!(
            "Execution {}: failed to record progress, abandoning: {}",
            execution_id, e
        );
        self.active.lock().await.remove(&execution_id);
    }
}

/// Resolves once cancellation is requested or the execution is no longer tracked
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|cancel| *cancel).await;
}
