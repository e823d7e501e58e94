//! Approval DTOs

use serde::{Deserialize, Serialize};

use crate::domain::approval::Verdict;

/// Decision submitted for a pending approval request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitDecision {
    pub verdict: Verdict,
    /// Identity of the person deciding
    pub decider: String,
}
