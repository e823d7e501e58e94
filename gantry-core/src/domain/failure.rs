//! Stage failure taxonomy
//!
//! Every way a stage can fail an execution. These are recorded against the
//! execution and returned by status queries, so they are serializable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::fleet::TargetId;

/// Why a stage failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageFailure {
    /// The repository or ref could not be resolved
    #[error("source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    /// A build command exited non-zero (or the environment could not run it)
    #[error("build failed (log: {log_ref})")]
    BuildFailed {
        log_ref: String,
        /// Phase containing the failing command, when known
        phase: Option<String>,
    },

    /// A human rejected the approval request
    #[error("approval rejected by {decider}")]
    ApprovalRejected { decider: String },

    /// No decision arrived within the configured wait
    #[error("approval timed out")]
    ApprovalTimedOut,

    /// The approval notification could not be dispatched
    #[error("notification failed: {reason}")]
    NotificationFailed { reason: String },

    /// One or more fleet targets did not acknowledge delivery
    #[error("deploy failed on {} target(s): {}", .failing_targets.len(), .failing_targets.join(", "))]
    DeployFailed { failing_targets: Vec<TargetId> },

    /// The fleet selector resolved to no targets
    #[error("fleet '{fleet}' has no targets")]
    EmptyFleet { fleet: String },

    /// The fleet manager could not list the fleet's targets
    #[error("fleet '{fleet}' unavailable: {reason}")]
    FleetUnavailable { fleet: String, reason: String },

    /// The isolated execution environment could not run the build at all
    #[error("execution environment unavailable: {reason}")]
    EnvironmentUnavailable { reason: String },

    /// A stage that consumes an artifact ran before any was produced
    #[error("no input artifact available")]
    MissingArtifact,

    /// The orchestrator could not record stage state
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl StageFailure {
    /// Short machine-friendly name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            StageFailure::SourceUnavailable { .. } => "SourceUnavailable",
            StageFailure::BuildFailed { .. } => "BuildFailed",
            StageFailure::ApprovalRejected { .. } => "ApprovalRejected",
            StageFailure::ApprovalTimedOut => "ApprovalTimedOut",
            StageFailure::NotificationFailed { .. } => "NotificationFailed",
            StageFailure::DeployFailed { .. } => "DeployFailed",
            StageFailure::EmptyFleet { .. } => "EmptyFleet",
            StageFailure::FleetUnavailable { .. } => "FleetUnavailable",
            StageFailure::EnvironmentUnavailable { .. } => "EnvironmentUnavailable",
            StageFailure::MissingArtifact => "MissingArtifact",
            StageFailure::Internal { .. } => "Internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_failed_message_lists_targets() {
        let failure = StageFailure::DeployFailed {
            failing_targets: vec!["i-1".to_string(), "i-3".to_string()],
        };
        assert_eq!(failure.to_string(), "deploy failed on 2 target(s): i-1, i-3");
        assert_eq!(failure.kind(), "DeployFailed");
    }

    #[test]
    fn test_failure_serializes_with_kind_tag() {
        let failure = StageFailure::BuildFailed {
            log_ref: "/var/log/gantry/x.log".to_string(),
            phase: Some("build".to_string()),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "build_failed");
        assert_eq!(json["log_ref"], "/var/log/gantry/x.log");

        let back: StageFailure = serde_json::from_value(json).unwrap();
        assert_eq!(back, failure);
    }
}
