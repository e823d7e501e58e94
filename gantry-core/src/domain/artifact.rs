//! Artifact domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable bundle produced by one stage and consumed by the next
///
/// A fresh id is minted every time a stage produces output, so re-running a
/// pipeline supersedes earlier artifacts instead of mutating them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    /// Name of the stage that produced this artifact
    pub producing_stage: String,
    /// Where the payload lives (a directory path or URI understood by the collaborators)
    pub payload_location: String,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Mints a new artifact for the given stage and payload location
    pub fn new(producing_stage: impl Into<String>, payload_location: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            producing_stage: producing_stage.into(),
            payload_location: payload_location.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_artifacts_get_distinct_ids() {
        let a = Artifact::new("Build", "/tmp/a");
        let b = Artifact::new("Build", "/tmp/a");

        assert_ne!(a.id, b.id);
        assert_eq!(a.producing_stage, "Build");
        assert_eq!(a.payload_location, b.payload_location);
    }
}
