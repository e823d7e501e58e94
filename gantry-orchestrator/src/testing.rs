//! In-memory collaborator doubles shared by the unit tests

use async_trait::async_trait;
use gantry_core::domain::approval::{ApprovalRequest, Decision};
use gantry_core::domain::artifact::Artifact;
use gantry_core::domain::fleet::TargetId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::ports::{
    CollaboratorError, Collaborators, ContentSnapshot, ExecutionEnvironment, FleetManager,
    IsolatedOutcome, IsolatedRun, Notification, NotificationTransport, SourceControl,
};
use crate::repository::Store;

/// Polls `condition` until it holds, panicking after five seconds
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Waits for the oldest pending approval request to appear
pub async fn pending_approval(store: &dyn Store) -> ApprovalRequest {
    for _ in 0..500 {
        let pending = store.list_approvals(Decision::Pending).await.unwrap();
        if let Some(request) = pending.into_iter().next() {
            return request;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no pending approval appeared");
}

// =============================================================================
// Source control
// =============================================================================

#[derive(Default)]
pub struct FakeSource {
    heads: Mutex<HashMap<String, String>>,
    resolved: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn with_head(repository: &str, commit: &str) -> Self {
        let source = Self::default();
        source.set_head(repository, commit);
        source
    }

    pub fn set_head(&self, repository: &str, commit: &str) {
        self.heads
            .lock()
            .unwrap()
            .insert(repository.to_string(), commit.to_string());
    }

    /// Refs passed to `resolve_ref`, in call order
    pub fn resolved_refs(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }

    fn commit_of(&self, repository: &str) -> Result<String, CollaboratorError> {
        self.heads
            .lock()
            .unwrap()
            .get(repository)
            .cloned()
            .ok_or_else(|| CollaboratorError::Rejected(format!("unknown repository {}", repository)))
    }
}

#[async_trait]
impl SourceControl for FakeSource {
    async fn resolve_ref(
        &self,
        repository: &str,
        git_ref: &str,
    ) -> Result<ContentSnapshot, CollaboratorError> {
        self.resolved.lock().unwrap().push(git_ref.to_string());
        let commit = self.commit_of(repository)?;
        Ok(ContentSnapshot {
            location: format!("snapshots/{}/{}", repository, commit),
            commit,
        })
    }

    async fn head(&self, repository: &str, _git_ref: &str) -> Result<String, CollaboratorError> {
        self.commit_of(repository)
    }
}

// =============================================================================
// Execution environment
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Script {
    Succeed,
    /// Command at this index exits 1
    FailAt(usize),
    /// The environment cannot be started
    Broken,
    /// Never finishes
    Hang,
}

pub struct ScriptedEnvironment {
    script: Script,
    runs: Mutex<Vec<IsolatedRun>>,
}

impl ScriptedEnvironment {
    fn scripted(script: Script) -> Self {
        Self {
            script,
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::scripted(Script::Succeed)
    }

    pub fn failing_at(command_index: usize) -> Self {
        Self::scripted(Script::FailAt(command_index))
    }

    pub fn broken() -> Self {
        Self::scripted(Script::Broken)
    }

    pub fn hanging() -> Self {
        Self::scripted(Script::Hang)
    }

    pub fn runs(&self) -> Vec<IsolatedRun> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionEnvironment for ScriptedEnvironment {
    async fn run_isolated(&self, run: IsolatedRun) -> Result<IsolatedOutcome, CollaboratorError> {
        self.runs.lock().unwrap().push(run.clone());
        let log_ref = format!("/logs/{}.log", run.label);

        match self.script {
            Script::Succeed => Ok(IsolatedOutcome {
                exit_code: 0,
                log_ref,
                commands_run: run.commands.len(),
                output_location: Some(format!("/artifacts/{}", run.label)),
            }),
            Script::FailAt(index) => Ok(IsolatedOutcome {
                exit_code: 1,
                log_ref,
                commands_run: (index + 1).min(run.commands.len()),
                output_location: None,
            }),
            Script::Broken => Err(CollaboratorError::Command(
                "container runtime not available".to_string(),
            )),
            Script::Hang => std::future::pending().await,
        }
    }
}

// =============================================================================
// Notifications
// =============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    topics: HashMap<String, Vec<String>>,
    failing: bool,
    sent: Mutex<Vec<(Vec<String>, Notification)>>,
}

impl RecordingNotifier {
    pub fn with_recipients(topic: &str, recipients: &[&str]) -> Self {
        let mut topics = HashMap::new();
        topics.insert(
            topic.to_string(),
            recipients.iter().map(|r| r.to_string()).collect(),
        );
        Self {
            topics,
            ..Self::default()
        }
    }

    /// Knows recipients for every topic but cannot deliver
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(Vec<String>, Notification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationTransport for RecordingNotifier {
    async fn recipients(&self, topic: &str) -> Result<Vec<String>, CollaboratorError> {
        if self.failing {
            return Ok(vec!["ops@example.com".to_string()]);
        }
        Ok(self.topics.get(topic).cloned().unwrap_or_default())
    }

    async fn send(
        &self,
        recipients: &[String],
        notification: &Notification,
    ) -> Result<(), CollaboratorError> {
        if self.failing {
            return Err(CollaboratorError::Rejected("mail relay refused".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipients.to_vec(), notification.clone()));
        Ok(())
    }
}

// =============================================================================
// Fleet
// =============================================================================

pub struct FakeFleet {
    targets: Mutex<Vec<TargetId>>,
    failing: HashSet<TargetId>,
    deliveries: Mutex<Vec<(TargetId, Artifact)>>,
}

impl FakeFleet {
    pub fn new(targets: &[&str], failing: &[&str]) -> Self {
        Self {
            targets: Mutex::new(targets.iter().map(|t| t.to_string()).collect()),
            failing: failing.iter().map(|t| t.to_string()).collect(),
            deliveries: Mutex::new(Vec::new()),
        }
    }

    pub fn set_targets(&self, targets: &[&str]) {
        *self.targets.lock().unwrap() = targets.iter().map(|t| t.to_string()).collect();
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }

    pub fn delivered_artifacts(&self) -> Vec<Artifact> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, artifact)| artifact.clone())
            .collect()
    }
}

#[async_trait]
impl FleetManager for FakeFleet {
    async fn list_targets(&self, _selector: &str) -> Result<Vec<TargetId>, CollaboratorError> {
        Ok(self.targets.lock().unwrap().clone())
    }

    async fn deliver(
        &self,
        target: &TargetId,
        artifact: &Artifact,
    ) -> Result<(), CollaboratorError> {
        self.deliveries
            .lock()
            .unwrap()
            .push((target.clone(), artifact.clone()));
        if self.failing.contains(target) {
            return Err(CollaboratorError::Rejected(format!("{} is unhealthy", target)));
        }
        Ok(())
    }
}

/// One of each double, wired for the canonical pipeline
pub struct Fakes {
    pub source: Arc<FakeSource>,
    pub environment: Arc<ScriptedEnvironment>,
    pub notifier: Arc<RecordingNotifier>,
    pub fleet: Arc<FakeFleet>,
}

impl Fakes {
    pub fn new(environment: ScriptedEnvironment, fleet: FakeFleet) -> Self {
        Self {
            source: Arc::new(FakeSource::with_head("app", "c0ffee")),
            environment: Arc::new(environment),
            notifier: Arc::new(RecordingNotifier::with_recipients(
                "releases",
                &["ops@example.com"],
            )),
            fleet: Arc::new(fleet),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            source: self.source.clone(),
            environment: self.environment.clone(),
            notifier: self.notifier.clone(),
            fleet: self.fleet.clone(),
        }
    }
}
