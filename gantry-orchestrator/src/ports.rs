//! Collaborator ports
//!
//! Narrow interfaces to the systems the orchestrator drives but does not own:
//! source control, the isolated build environment, the notification transport,
//! and fleet management. Production adapters live in `adapters`; tests use
//! in-memory doubles.

use async_trait::async_trait;
use gantry_core::domain::artifact::Artifact;
use gantry_core::domain::buildspec::ArtifactPaths;
use gantry_core::domain::fleet::TargetId;
use std::sync::Arc;
use thiserror::Error;

/// Error reported by a collaborator
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// An external command exited unsuccessfully
    #[error("command failed: {0}")]
    Command(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The collaborator understood the request and refused it
    #[error("{0}")]
    Rejected(String),
}

// =============================================================================
// Source control
// =============================================================================

/// Snapshot of a repository at a resolved ref
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSnapshot {
    /// Commit the ref resolved to
    pub commit: String,
    /// Where the snapshot's files were materialized
    pub location: String,
}

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Materializes the repository at `git_ref` (branch, tag or commit)
    async fn resolve_ref(
        &self,
        repository: &str,
        git_ref: &str,
    ) -> Result<ContentSnapshot, CollaboratorError>;

    /// Current commit of `git_ref` without fetching content
    async fn head(&self, repository: &str, git_ref: &str) -> Result<String, CollaboratorError>;
}

// =============================================================================
// Isolated execution environment
// =============================================================================

/// One isolated, ephemeral run of a command list
#[derive(Debug, Clone)]
pub struct IsolatedRun {
    /// Human-readable label used for container and log naming
    pub label: String,
    pub image: String,
    /// Commands in execution order; the run stops at the first failure
    pub commands: Vec<String>,
    /// Contents to seed the workspace with
    pub input_location: Option<String>,
    /// Paths to collect when every command succeeds
    pub outputs: ArtifactPaths,
}

/// Result of an isolated run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedOutcome {
    /// Exit code of the last command that ran
    pub exit_code: i32,
    /// Reference to the captured log
    pub log_ref: String,
    /// Number of commands that were started
    pub commands_run: usize,
    /// Collected outputs, present only when every command succeeded
    pub output_location: Option<String>,
}

impl IsolatedOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    /// Runs the commands in a fresh environment
    ///
    /// Command failures are reported through [`IsolatedOutcome::exit_code`];
    /// `Err` means the environment itself could not be used.
    async fn run_isolated(&self, run: IsolatedRun) -> Result<IsolatedOutcome, CollaboratorError>;
}

// =============================================================================
// Notification transport
// =============================================================================

/// Message sent to approvers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub topic: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Addresses currently subscribed to `topic`
    async fn recipients(&self, topic: &str) -> Result<Vec<String>, CollaboratorError>;

    async fn send(
        &self,
        recipients: &[String],
        notification: &Notification,
    ) -> Result<(), CollaboratorError>;
}

// =============================================================================
// Fleet management
// =============================================================================

#[async_trait]
pub trait FleetManager: Send + Sync {
    /// Current members of the fleet matching `selector`
    async fn list_targets(&self, selector: &str) -> Result<Vec<TargetId>, CollaboratorError>;

    /// Delivers `artifact` to a single target
    async fn deliver(&self, target: &TargetId, artifact: &Artifact)
    -> Result<(), CollaboratorError>;
}

/// The full set of collaborators the stages need
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SourceControl>,
    pub environment: Arc<dyn ExecutionEnvironment>,
    pub notifier: Arc<dyn NotificationTransport>,
    pub fleet: Arc<dyn FleetManager>,
}
