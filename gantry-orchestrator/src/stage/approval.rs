//! Approval gate
//!
//! Suspends an execution until a human approves or rejects it. Each time the
//! gate is entered a new `ApprovalRequest` is persisted, its live gate is
//! registered, and one notification goes out to the topic's recipients. The
//! driver task then waits on a oneshot channel that only `decide` can fire.
//!
//! Every transition out of `Pending` (decision, timeout, supersede) happens
//! while holding the registry lock, so exactly one of them wins.

use gantry_core::domain::approval::{ApprovalRequest, Decision, Verdict};
use gantry_core::domain::artifact::Artifact;
use gantry_core::domain::failure::StageFailure;
use gantry_core::domain::pipeline::ApprovalConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::StageContext;
use crate::ports::{Notification, NotificationTransport};
use crate::repository::{Store, StoreError};

/// Why a decision was not applied
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("approval request not found")]
    NotFound,

    /// The request is no longer pending or its gate has already closed
    #[error("approval request is no longer pending")]
    Stale,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Decision delivered to a waiting gate
#[derive(Debug)]
struct Decided {
    decision: Decision,
    decided_by: Option<String>,
}

struct LiveGate {
    execution_id: Uuid,
    sender: oneshot::Sender<Decided>,
}

/// Gates currently waiting for a decision, keyed by approval id
#[derive(Default)]
pub struct GateRegistry {
    gates: Mutex<HashMap<Uuid, LiveGate>>,
}

impl GateRegistry {
    pub async fn is_live(&self, approval_id: Uuid) -> bool {
        self.gates.lock().await.contains_key(&approval_id)
    }

    pub async fn len(&self) -> usize {
        self.gates.lock().await.len()
    }
}

pub struct ApprovalGate {
    notifier: Arc<dyn NotificationTransport>,
    store: Arc<dyn Store>,
    project: String,
    registry: GateRegistry,
}

impl ApprovalGate {
    pub fn new(
        notifier: Arc<dyn NotificationTransport>,
        store: Arc<dyn Store>,
        project: String,
    ) -> Self {
        Self {
            notifier,
            store,
            project,
            registry: GateRegistry::default(),
        }
    }

    pub fn registry(&self) -> &GateRegistry {
        &self.registry
    }

    /// Runs one occurrence of the gate to completion
    ///
    /// Returns `Ok(())` only when the request was approved.
    pub async fn await_decision(
        &self,
        ctx: &StageContext,
        input: Option<&Artifact>,
        config: &ApprovalConfig,
    ) -> Result<(), StageFailure> {
        let request = ApprovalRequest::pending(
            ctx.execution_id,
            ctx.stage_index,
            &ctx.stage_name,
            input.map(|a| a.id),
        );
        let (tx, mut rx) = oneshot::channel();

        {
            let mut gates = self.registry.gates.lock().await;
            self.store
                .insert_approval(&request)
                .await
                .map_err(internal)?;
            gates.insert(
                request.id,
                LiveGate {
                    execution_id: ctx.execution_id,
                    sender: tx,
                },
            );
        }

        if let Err(reason) = self.notify(ctx, &request, input, config).await {
            error!(
                "Approval {} for execution {}: notification failed: {}",
                request.id, ctx.execution_id, reason
            );
            self.withdraw(request.id).await;
            return Err(StageFailure::NotificationFailed { reason });
        }

        info!(
            "Execution {}: waiting for approval {} on topic '{}'",
            ctx.execution_id, request.id, config.topic
        );

        let received = match config.timeout_seconds {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), &mut rx).await {
                    Ok(received) => received,
                    Err(_) => return self.expire(request, rx).await,
                }
            }
            None => (&mut rx).await,
        };

        match received {
            Ok(decided) => settle(request.id, decided),
            Err(_) => Err(StageFailure::Internal {
                reason: format!("approval {} was withdrawn", request.id),
            }),
        }
    }

    /// Applies a human decision to a live gate
    pub async fn decide(
        &self,
        approval_id: Uuid,
        verdict: Verdict,
        decider: &str,
    ) -> Result<ApprovalRequest, DecisionError> {
        let mut gates = self.registry.gates.lock().await;

        let mut request = self
            .store
            .get_approval(approval_id)
            .await?
            .ok_or(DecisionError::NotFound)?;

        if !request.decision.is_pending() || !gates.contains_key(&approval_id) {
            debug!(
                "Ignoring {:?} for approval {} in state {}",
                verdict, approval_id, request.decision
            );
            return Err(DecisionError::Stale);
        }

        let decision = Decision::from(verdict);
        request.resolve(decision, Some(decider.to_string()));
        self.store.update_approval(&request).await?;

        if let Some(gate) = gates.remove(&approval_id) {
            // The waiting side may already be gone if its execution was dropped
            let _ = gate.sender.send(Decided {
                decision,
                decided_by: Some(decider.to_string()),
            });
        }

        info!("Approval {} {} by {}", approval_id, decision, decider);
        Ok(request)
    }

    /// Closes every open request of an execution, marking it `Superseded`
    ///
    /// Covers live gates as well as pending requests persisted by an earlier
    /// process, which have no gate to close.
    pub async fn supersede(&self, execution_id: Uuid) -> usize {
        let mut gates = self.registry.gates.lock().await;

        let mut closing: Vec<Uuid> = gates
            .iter()
            .filter(|(_, gate)| gate.execution_id == execution_id)
            .map(|(id, _)| *id)
            .collect();
        for approval_id in &closing {
            gates.remove(approval_id);
        }

        match self.store.list_approvals_for_execution(execution_id).await {
            Ok(requests) => {
                let stored: Vec<Uuid> = requests
                    .iter()
                    .filter(|r| r.decision.is_pending() && !closing.contains(&r.id))
                    .map(|r| r.id)
                    .collect();
                closing.extend(stored);
            }
            Err(e) => error!(
                "Failed to list approvals of execution {}: {}",
                execution_id, e
            ),
        }

        for approval_id in &closing {
            self.mark(*approval_id, Decision::Superseded).await;
        }

        if !closing.is_empty() {
            info!(
                "Superseded {} approval(s) of execution {}",
                closing.len(),
                execution_id
            );
        }
        closing.len()
    }

    /// Marks pending requests that no gate in this process waits on `Superseded`
    pub async fn supersede_orphaned(&self) -> Result<usize, StoreError> {
        let gates = self.registry.gates.lock().await;

        let orphaned: Vec<Uuid> = self
            .store
            .list_approvals(Decision::Pending)
            .await?
            .into_iter()
            .filter(|request| !gates.contains_key(&request.id))
            .map(|request| request.id)
            .collect();

        for approval_id in &orphaned {
            self.mark(*approval_id, Decision::Superseded).await;
        }

        if !orphaned.is_empty() {
            warn!("Superseded {} orphaned approval(s)", orphaned.len());
        }
        Ok(orphaned.len())
    }

    async fn notify(
        &self,
        ctx: &StageContext,
        request: &ApprovalRequest,
        input: Option<&Artifact>,
        config: &ApprovalConfig,
    ) -> Result<(), String> {
        let recipients = self
            .notifier
            .recipients(&config.topic)
            .await
            .map_err(|e| e.to_string())?;

        if recipients.is_empty() {
            return Err(format!("no recipients subscribed to '{}'", config.topic));
        }

        let notification = Notification {
            topic: config.topic.clone(),
            subject: format!(
                "[{}] Approval needed: {} / {}",
                self.project, ctx.pipeline_name, ctx.stage_name
            ),
            body: approval_body(ctx, request, input, config),
        };

        self.notifier
            .send(&recipients, &notification)
            .await
            .map_err(|e| e.to_string())
    }

    /// Timeout path; a decision that raced the timer still wins
    async fn expire(
        &self,
        request: ApprovalRequest,
        mut rx: oneshot::Receiver<Decided>,
    ) -> Result<(), StageFailure> {
        let mut gates = self.registry.gates.lock().await;

        if gates.remove(&request.id).is_some() {
            drop(gates);
            warn!(
                "Approval {} for execution {} timed out",
                request.id, request.execution_id
            );
            self.mark(request.id, Decision::TimedOut).await;
            return Err(StageFailure::ApprovalTimedOut);
        }
        drop(gates);

        match rx.try_recv() {
            Ok(decided) => settle(request.id, decided),
            Err(_) => Err(StageFailure::Internal {
                reason: format!("approval {} was withdrawn", request.id),
            }),
        }
    }

    /// Removes a gate that never reached its approvers
    async fn withdraw(&self, approval_id: Uuid) {
        let mut gates = self.registry.gates.lock().await;
        if gates.remove(&approval_id).is_some() {
            self.mark(approval_id, Decision::Superseded).await;
        }
    }

    async fn mark(&self, approval_id: Uuid, decision: Decision) {
        let mut request = match self.store.get_approval(approval_id).await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                error!("Failed to load approval {}: {}", approval_id, e);
                return;
            }
        };

        if request.resolve(decision, None) {
            if let Err(e) = self.store.update_approval(&request).await {
                error!("Failed to mark approval {} {}: {}", approval_id, decision, e);
            }
        }
    }
}

fn settle(approval_id: Uuid, decided: Decided) -> Result<(), StageFailure> {
    match decided.decision {
        Decision::Approved => Ok(()),
        Decision::Rejected => Err(StageFailure::ApprovalRejected {
            decider: decided.decided_by.unwrap_or_default(),
        }),
        other => Err(StageFailure::Internal {
            reason: format!("approval {} resolved as {}", approval_id, other),
        }),
    }
}

fn approval_body(
    ctx: &StageContext,
    request: &ApprovalRequest,
    input: Option<&Artifact>,
    config: &ApprovalConfig,
) -> String {
    let mut body = format!(
        "Pipeline: {}\nStage: {}\nExecution: {}\nApproval: {}\nArtifact: {}\n",
        ctx.pipeline_name,
        ctx.stage_name,
        ctx.execution_id,
        request.id,
        input
            .map(|a| a.id.to_string())
            .unwrap_or_else(|| "none".to_string()),
    );

    if let Some(timeout) = config.timeout_seconds {
        body.push_str(&format!("Expires after: {}s\n", timeout));
    }
    if let Some(message) = &config.message {
        body.push('\n');
        body.push_str(message);
        body.push('\n');
    }
    body
}

fn internal(e: StoreError) -> StageFailure {
    StageFailure::Internal {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;
    use crate::testing::{RecordingNotifier, pending_approval, wait_until};
    use gantry_core::domain::execution::Trigger;

    fn context() -> StageContext {
        StageContext {
            execution_id: Uuid::new_v4(),
            pipeline_name: "web".to_string(),
            stage_index: 2,
            stage_name: "Approval".to_string(),
            trigger: Trigger::manual(),
        }
    }

    fn config(timeout_seconds: Option<u64>) -> ApprovalConfig {
        ApprovalConfig {
            topic: "releases".to_string(),
            timeout_seconds,
            message: Some("Ship it?".to_string()),
        }
    }

    fn gate(notifier: Arc<RecordingNotifier>) -> (Arc<ApprovalGate>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let gate = Arc::new(ApprovalGate::new(
            notifier,
            store.clone(),
            "acme".to_string(),
        ));
        (gate, store)
    }

    #[tokio::test]
    async fn test_approve_releases_the_gate() {
        let notifier = Arc::new(RecordingNotifier::with_recipients(
            "releases",
            &["ops@example.com", "lead@example.com"],
        ));
        let (gate, store) = gate(notifier.clone());
        let ctx = context();
        let artifact = Artifact::new("Build", "/artifacts/a2");

        let waiting = {
            let gate = gate.clone();
            let ctx = ctx.clone();
            let artifact = artifact.clone();
            tokio::spawn(async move { gate.await_decision(&ctx, Some(&artifact), &config(None)).await })
        };

        let request = pending_approval(store.as_ref()).await;
        wait_until(|| !notifier.sent().is_empty()).await;

        let decided = gate
            .decide(request.id, Verdict::Approve, "alice")
            .await
            .unwrap();
        assert_eq!(decided.decision, Decision::Approved);
        assert_eq!(decided.decided_by.as_deref(), Some("alice"));

        assert_eq!(waiting.await.unwrap(), Ok(()));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        let (recipients, notification) = &sent[0];
        assert_eq!(recipients.len(), 2);
        assert!(notification.subject.starts_with("[acme]"));
        assert!(notification.body.contains(&ctx.execution_id.to_string()));
        assert!(notification.body.contains(&request.id.to_string()));
        assert!(notification.body.contains(&artifact.id.to_string()));
        assert_eq!(request.artifact_id, Some(artifact.id));
    }

    #[tokio::test]
    async fn test_reject_records_decider() {
        let notifier = Arc::new(RecordingNotifier::with_recipients("releases", &["ops@example.com"]));
        let (gate, store) = gate(notifier);
        let ctx = context();

        let waiting = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.await_decision(&ctx, None, &config(None)).await })
        };

        let request = pending_approval(store.as_ref()).await;
        gate.decide(request.id, Verdict::Reject, "bob").await.unwrap();

        assert_eq!(
            waiting.await.unwrap(),
            Err(StageFailure::ApprovalRejected {
                decider: "bob".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_second_decision_is_stale() {
        let notifier = Arc::new(RecordingNotifier::with_recipients("releases", &["ops@example.com"]));
        let (gate, store) = gate(notifier);
        let ctx = context();

        let waiting = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.await_decision(&ctx, None, &config(None)).await })
        };

        let request = pending_approval(store.as_ref()).await;
        gate.decide(request.id, Verdict::Approve, "alice").await.unwrap();
        waiting.await.unwrap().unwrap();

        let second = gate.decide(request.id, Verdict::Reject, "bob").await;
        assert!(matches!(second, Err(DecisionError::Stale)));

        let stored = store.get_approval(request.id).await.unwrap().unwrap();
        assert_eq!(stored.decision, Decision::Approved);
        assert_eq!(stored.decided_by.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_unknown_approval_is_not_found() {
        let notifier = Arc::new(RecordingNotifier::with_recipients("releases", &["ops@example.com"]));
        let (gate, _) = gate(notifier);

        let result = gate.decide(Uuid::new_v4(), Verdict::Approve, "alice").await;

        assert!(matches!(result, Err(DecisionError::NotFound)));
    }

    #[tokio::test]
    async fn test_timeout_fails_and_marks_request() {
        let notifier = Arc::new(RecordingNotifier::with_recipients("releases", &["ops@example.com"]));
        let (gate, store) = gate(notifier);
        let ctx = context();

        let result = gate.await_decision(&ctx, None, &config(Some(1))).await;
        assert_eq!(result, Err(StageFailure::ApprovalTimedOut));

        let requests = store
            .list_approvals_for_execution(ctx.execution_id)
            .await
            .unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].decision, Decision::TimedOut);

        let late = gate.decide(requests[0].id, Verdict::Approve, "alice").await;
        assert!(matches!(late, Err(DecisionError::Stale)));
        assert_eq!(gate.registry().len().await, 0);
    }

    #[tokio::test]
    async fn test_notification_failure_fails_stage() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let (gate, store) = gate(notifier);
        let ctx = context();

        let result = gate.await_decision(&ctx, None, &config(None)).await;

        assert!(matches!(
            result,
            Err(StageFailure::NotificationFailed { .. })
        ));
        let requests = store
            .list_approvals_for_execution(ctx.execution_id)
            .await
            .unwrap();
        assert_eq!(requests[0].decision, Decision::Superseded);
        assert_eq!(gate.registry().len().await, 0);
    }

    #[tokio::test]
    async fn test_no_recipients_fails_stage() {
        let notifier = Arc::new(RecordingNotifier::with_recipients("other-topic", &["ops@example.com"]));
        let (gate, _) = gate(notifier.clone());

        let result = gate.await_decision(&context(), None, &config(None)).await;

        assert!(matches!(
            result,
            Err(StageFailure::NotificationFailed { .. })
        ));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_supersede_closes_live_gates() {
        let notifier = Arc::new(RecordingNotifier::with_recipients("releases", &["ops@example.com"]));
        let (gate, store) = gate(notifier);
        let ctx = context();
        let execution_id = ctx.execution_id;

        let waiting = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.await_decision(&ctx, None, &config(None)).await })
        };

        let request = pending_approval(store.as_ref()).await;
        assert!(gate.registry().is_live(request.id).await);

        assert_eq!(gate.supersede(execution_id).await, 1);
        assert!(matches!(
            waiting.await.unwrap(),
            Err(StageFailure::Internal { .. })
        ));

        let stored = store.get_approval(request.id).await.unwrap().unwrap();
        assert_eq!(stored.decision, Decision::Superseded);

        let late = gate.decide(request.id, Verdict::Approve, "alice").await;
        assert!(matches!(late, Err(DecisionError::Stale)));
    }

    #[tokio::test]
    async fn test_supersede_closes_stored_requests_without_gate() {
        let notifier = Arc::new(RecordingNotifier::with_recipients("releases", &["ops@example.com"]));
        let (gate, store) = gate(notifier);
        let execution_id = Uuid::new_v4();
        let stored = ApprovalRequest::pending(execution_id, 2, "Approval", None);
        store.insert_approval(&stored).await.unwrap();

        assert_eq!(gate.supersede(execution_id).await, 1);

        let request = store.get_approval(stored.id).await.unwrap().unwrap();
        assert_eq!(request.decision, Decision::Superseded);
        assert_eq!(gate.supersede(execution_id).await, 0);
    }

    #[tokio::test]
    async fn test_orphaned_requests_are_superseded_live_ones_kept() {
        let notifier = Arc::new(RecordingNotifier::with_recipients("releases", &["ops@example.com"]));
        let (gate, store) = gate(notifier);
        let ctx = context();

        let waiting = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.await_decision(&ctx, None, &config(None)).await })
        };
        let live = pending_approval(store.as_ref()).await;

        let orphan = ApprovalRequest::pending(Uuid::new_v4(), 2, "Approval", None);
        store.insert_approval(&orphan).await.unwrap();

        assert_eq!(gate.supersede_orphaned().await.unwrap(), 1);

        let orphan = store.get_approval(orphan.id).await.unwrap().unwrap();
        assert_eq!(orphan.decision, Decision::Superseded);

        let live = store.get_approval(live.id).await.unwrap().unwrap();
        assert_eq!(live.decision, Decision::Pending);
        gate.decide(live.id, Verdict::Approve, "alice").await.unwrap();
        assert_eq!(waiting.await.unwrap(), Ok(()));
    }
}
