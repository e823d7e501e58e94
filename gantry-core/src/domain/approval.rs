//! Approval domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One occurrence of an approval gate within an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub stage_index: usize,
    pub stage_name: String,
    /// Artifact awaiting approval, if any stage produced one
    pub artifact_id: Option<Uuid>,
    pub notified_at: DateTime<Utc>,
    pub decision: Decision,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// State of an approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Waiting for a human
    Pending,
    Approved,
    Rejected,
    /// The configured wait elapsed without a decision
    TimedOut,
    /// The owning execution was cancelled before a decision arrived
    Superseded,
}

impl Decision {
    pub fn is_pending(&self) -> bool {
        matches!(self, Decision::Pending)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Pending => write!(f, "Pending"),
            Decision::Approved => write!(f, "Approved"),
            Decision::Rejected => write!(f, "Rejected"),
            Decision::TimedOut => write!(f, "TimedOut"),
            Decision::Superseded => write!(f, "Superseded"),
        }
    }
}

/// Verdict a human can submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Reject,
}

impl From<Verdict> for Decision {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Approve => Decision::Approved,
            Verdict::Reject => Decision::Rejected,
        }
    }
}

impl ApprovalRequest {
    /// Creates a pending request stamped with the current time
    pub fn pending(
        execution_id: Uuid,
        stage_index: usize,
        stage_name: impl Into<String>,
        artifact_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            stage_index,
            stage_name: stage_name.into(),
            artifact_id,
            notified_at: Utc::now(),
            decision: Decision::Pending,
            decided_by: None,
            decided_at: None,
        }
    }

    /// Moves a pending request to a terminal decision
    ///
    /// Returns `false` (and changes nothing) when the request was already decided.
    pub fn resolve(&mut self, decision: Decision, decided_by: Option<String>) -> bool {
        if !self.decision.is_pending() || decision.is_pending() {
            return false;
        }
        self.decision = decision;
        self.decided_by = decided_by;
        self.decided_at = Some(Utc::now());
        true
    }
}
