//! Execution domain types
//!
//! An execution is one run of a specific pipeline version. It carries a record
//! per invoked stage so a status query alone is enough to diagnose a failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::artifact::Artifact;
use crate::domain::failure::StageFailure;

/// Execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    /// Definition version this execution runs against
    pub pipeline_version: u32,
    pub trigger: Trigger,
    pub status: ExecutionStatus,
    /// Index of the stage currently running (or the last one that ran)
    pub current_stage_index: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// One record per invoked stage, in definition order
    pub stages: Vec<StageRecord>,
    pub failure: Option<ExecutionFailure>,
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "Running"),
            ExecutionStatus::Succeeded => write!(f, "Succeeded"),
            ExecutionStatus::Failed => write!(f, "Failed"),
            ExecutionStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// What started an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Started through the API or CLI, optionally pinned to a ref
    Manual {
        #[serde(default)]
        git_ref: Option<String>,
    },
    /// Started by the source watcher after a new commit appeared
    SourceChange { commit: String },
}

impl Trigger {
    pub fn manual() -> Self {
        Trigger::Manual { git_ref: None }
    }

    /// Ref the source stage should resolve instead of its configured branch
    pub fn ref_override(&self) -> Option<&str> {
        match self {
            Trigger::Manual { git_ref } => git_ref.as_deref(),
            Trigger::SourceChange { commit } => Some(commit),
        }
    }
}

/// Per-stage history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub produced_artifact: Option<Artifact>,
    pub failure_reason: Option<StageFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// Where and why an execution failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub stage_index: usize,
    pub stage_name: String,
    pub reason: StageFailure,
}

impl Execution {
    /// Creates a running execution positioned at stage zero
    pub fn new(pipeline_id: Uuid, pipeline_version: u32, trigger: Trigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id,
            pipeline_version,
            trigger,
            status: ExecutionStatus::Running,
            current_stage_index: 0,
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
            failure: None,
        }
    }

    /// Opens a record for the stage at `index`
    ///
    /// The index never moves backwards; asking to begin an earlier stage is a no-op.
    pub fn begin_stage(&mut self, index: usize, name: &str) {
        if index < self.current_stage_index || index < self.stages.len() {
            return;
        }
        self.current_stage_index = index;
        self.stages.push(StageRecord {
            name: name.to_string(),
            status: StageStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            produced_artifact: None,
            failure_reason: None,
        });
    }

    /// Closes the active stage record as succeeded
    pub fn complete_stage(&mut self, artifact: Option<Artifact>) {
        if let Some(record) = self.active_record_mut() {
            record.status = StageStatus::Succeeded;
            record.finished_at = Some(Utc::now());
            record.produced_artifact = artifact;
        }
    }

    /// Closes the active stage record as failed and fails the execution
    pub fn fail_stage(&mut self, reason: StageFailure) {
        let index = self.current_stage_index;
        let mut stage_name = String::new();

        if let Some(record) = self.active_record_mut() {
            record.status = StageStatus::Failed;
            record.finished_at = Some(Utc::now());
            record.failure_reason = Some(reason.clone());
            stage_name = record.name.clone();
        }

        self.failure = Some(ExecutionFailure {
            stage_index: index,
            stage_name,
            reason,
        });
        self.finish(ExecutionStatus::Failed);
    }

    /// Marks the execution cancelled, closing any running stage record
    pub fn cancel(&mut self) {
        if let Some(record) = self.active_record_mut() {
            record.status = StageStatus::Cancelled;
            record.finished_at = Some(Utc::now());
        }
        self.finish(ExecutionStatus::Cancelled);
    }

    pub fn succeed(&mut self) {
        self.finish(ExecutionStatus::Succeeded);
    }

    /// Most recent artifact produced by any stage
    pub fn latest_artifact(&self) -> Option<&Artifact> {
        self.stages
            .iter()
            .rev()
            .find_map(|record| record.produced_artifact.as_ref())
    }

    fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    fn active_record_mut(&mut self) -> Option<&mut StageRecord> {
        self.stages
            .last_mut()
            .filter(|record| record.status == StageStatus::Running)
    }
}
