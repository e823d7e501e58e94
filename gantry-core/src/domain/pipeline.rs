//! Pipeline domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::buildspec::{BuildSpec, BuildSpecError};

/// Longest accepted pipeline name
pub const MAX_PIPELINE_NAME_LEN: usize = 255;

/// Versioned pipeline definition
///
/// A stored version is immutable: redefining a pipeline stores a new version
/// with the same `id` and `version + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    /// Stages in execution order
    pub stages: Vec<StageDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One named stage of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub kind: StageKind,
}

/// Stage kind with its kind-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageKind {
    Source(SourceConfig),
    Build(BuildConfig),
    Approval(ApprovalConfig),
    Deploy(DeployConfig),
}

/// Repository and branch a source stage snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub buildspec: BuildSpec,
}

/// Approval gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Notification topic whose subscribers are asked to decide
    pub topic: String,
    /// Maximum wait; `None` waits indefinitely
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Extra text included in the notification
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Fleet selector resolved by the fleet manager at deploy time
    pub fleet: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl StageKind {
    pub fn label(&self) -> &'static str {
        match self {
            StageKind::Source(_) => "source",
            StageKind::Build(_) => "build",
            StageKind::Approval(_) => "approval",
            StageKind::Deploy(_) => "deploy",
        }
    }
}

/// Reasons a definition is rejected
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("pipeline name cannot be empty")]
    BlankName,

    #[error("pipeline name is too long (max 255 characters)")]
    NameTooLong,

    #[error("pipeline must contain at least one stage")]
    NoStages,

    #[error("stage {0} has an empty name")]
    BlankStageName(usize),

    #[error("duplicate stage name '{0}'")]
    DuplicateStageName(String),

    #[error("stage '{stage}': {field} cannot be empty")]
    BlankField { stage: String, field: &'static str },

    #[error("stage '{0}': approval timeout must be greater than 0")]
    ZeroTimeout(String),

    #[error("stage '{stage}': {source}")]
    InvalidBuildSpec {
        stage: String,
        #[source]
        source: BuildSpecError,
    },
}

impl PipelineDefinition {
    /// First version of a new pipeline
    pub fn new(name: impl Into<String>, stages: Vec<StageDescriptor>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: 1,
            stages,
            created_at: now,
            updated_at: now,
        }
    }

    /// Next version of this pipeline with a replaced stage list
    pub fn redefined(&self, stages: Vec<StageDescriptor>) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            version: self.version + 1,
            stages,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    /// Validates the name and the stage list
    pub fn validate(&self) -> Result<(), DefinitionError> {
        validate_name(&self.name)?;
        validate_stages(&self.stages)
    }

    /// Configuration of the first source stage, if any
    pub fn primary_source(&self) -> Option<&SourceConfig> {
        self.stages.iter().find_map(|stage| match &stage.kind {
            StageKind::Source(config) => Some(config),
            _ => None,
        })
    }
}

pub fn validate_name(name: &str) -> Result<(), DefinitionError> {
    if name.trim().is_empty() {
        return Err(DefinitionError::BlankName);
    }
    if name.len() > MAX_PIPELINE_NAME_LEN {
        return Err(DefinitionError::NameTooLong);
    }
    Ok(())
}

/// Checks stage-list invariants: non-empty, unique non-blank names, sane configs
pub fn validate_stages(stages: &[StageDescriptor]) -> Result<(), DefinitionError> {
    if stages.is_empty() {
        return Err(DefinitionError::NoStages);
    }

    let mut seen = HashSet::new();
    for (index, stage) in stages.iter().enumerate() {
        if stage.name.trim().is_empty() {
            return Err(DefinitionError::BlankStageName(index));
        }
        if !seen.insert(stage.name.as_str()) {
            return Err(DefinitionError::DuplicateStageName(stage.name.clone()));
        }
        validate_kind(&stage.name, &stage.kind)?;
    }

    Ok(())
}

fn validate_kind(stage: &str, kind: &StageKind) -> Result<(), DefinitionError> {
    let blank = |field| DefinitionError::BlankField {
        stage: stage.to_string(),
        field,
    };

    match kind {
        StageKind::Source(config) => {
            if config.repository.trim().is_empty() {
                return Err(blank("repository"));
            }
            if config.branch.trim().is_empty() {
                return Err(blank("branch"));
            }
        }
        StageKind::Build(config) => {
            config
                .buildspec
                .validate()
                .map_err(|source| DefinitionError::InvalidBuildSpec {
                    stage: stage.to_string(),
                    source,
                })?;
        }
        StageKind::Approval(config) => {
            if config.topic.trim().is_empty() {
                return Err(blank("topic"));
            }
            if config.timeout_seconds == Some(0) {
                return Err(DefinitionError::ZeroTimeout(stage.to_string()));
            }
        }
        StageKind::Deploy(config) => {
            if config.fleet.trim().is_empty() {
                return Err(blank("fleet"));
            }
        }
    }

    Ok(())
}
