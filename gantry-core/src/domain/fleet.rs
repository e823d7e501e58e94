//! Fleet domain types

use serde::{Deserialize, Serialize};

/// Identifier of a deployment target (instance or group reference)
pub type TargetId = String;

/// Outcome of a successful deploy stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResult {
    /// Fleet selector the targets were resolved from
    pub fleet: String,
    /// Every target that acknowledged delivery
    pub delivered: Vec<TargetId>,
}
