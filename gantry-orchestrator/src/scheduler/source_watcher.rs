//! Source watcher
//!
//! Polls the head commit of every pipeline's first source stage and starts an
//! execution when it moves. A pipeline that is already running is skipped;
//! the new commit is picked up on a later tick once the run has finished.

use anyhow::{Context, Result};
use gantry_core::domain::execution::Trigger;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ports::SourceControl;
use crate::service::{Orchestrator, OrchestratorError};

pub struct SourceWatcher {
    orchestrator: Arc<Orchestrator>,
    source: Arc<dyn SourceControl>,
    interval: Duration,
    /// Last commit acted on, per pipeline
    seen: Mutex<HashMap<Uuid, String>>,
}

impl SourceWatcher {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        source: Arc<dyn SourceControl>,
        interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            source,
            interval,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) {
        info!("Starting source watcher (interval: {:?})", self.interval);

        let mut interval = time::interval(self.interval);

        loop {
            interval.tick().await;

            match self.poll_once().await {
                Ok(launched) => {
                    if launched > 0 {
                        info!("Started {} execution(s) from source changes", launched);
                    }
                }
                Err(e) => {
                    error!("Error during source poll: {:#}", e);
                }
            }
        }
    }

    /// Checks every pipeline once, returning how many executions were started
    pub async fn poll_once(&self) -> Result<usize> {
        let definitions = self
            .orchestrator
            .store()
            .list_latest_definitions()
            .await
            .context("Failed to list pipelines")?;

        let mut launched = 0;

        for definition in definitions {
            let Some(source) = definition.primary_source() else {
                continue;
            };

            let commit = match self.source.head(&source.repository, &source.branch).await {
                Ok(commit) => commit,
                Err(e) => {
                    warn!(
                        "Failed to read head of {}@{}: {}",
                        source.repository, source.branch, e
                    );
                    continue;
                }
            };

            let previous = self.seen.lock().await.get(&definition.id).cloned();
            match previous {
                None => {
                    debug!(
                        "Watching '{}' from {}@{} ({})",
                        definition.name, source.repository, source.branch, commit
                    );
                    self.remember(definition.id, commit).await;
                    continue;
                }
                Some(previous) if previous == commit => continue,
                Some(_) => {}
            }

            if self.orchestrator.has_running(definition.id).await {
                debug!(
                    "'{}' has a new commit {} but is still running, deferring",
                    definition.name, commit
                );
                continue;
            }

            let trigger = Trigger::SourceChange {
                commit: commit.clone(),
            };
            match self.orchestrator.start(&definition, trigger).await {
                Ok(execution_id) => {
                    info!(
                        "Commit {} on {}@{} started execution {}",
                        commit, source.repository, source.branch, execution_id
                    );
                    self.remember(definition.id, commit).await;
                    launched += 1;
                }
                // Started elsewhere since the check above; retried next tick
                Err(OrchestratorError::AlreadyRunning { .. }) => {
                    debug!("'{}' started concurrently, deferring {}", definition.name, commit);
                }
                Err(e) => {
                    error!("Failed to start '{}' for commit {}: {}", definition.name, commit, e);
                }
            }
        }

        Ok(launched)
    }

    async fn remember(&self, pipeline_id: Uuid, commit: String) {
        self.seen.lock().await.insert(pipeline_id, commit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryStore, Store};
    use crate::testing::{FakeFleet, Fakes, ScriptedEnvironment};
    use gantry_core::domain::buildspec::{ArtifactPaths, BuildSpec, Phase};
    use gantry_core::domain::pipeline::{
        BuildConfig, PipelineDefinition, SourceConfig, StageDescriptor, StageKind,
    };

    fn definition() -> PipelineDefinition {
        PipelineDefinition::new(
            "web",
            vec![
                StageDescriptor {
                    name: "Source".to_string(),
                    kind: StageKind::Source(SourceConfig {
                        repository: "app".to_string(),
                        branch: "main".to_string(),
                    }),
                },
                StageDescriptor {
                    name: "Build".to_string(),
                    kind: StageKind::Build(BuildConfig {
                        buildspec: BuildSpec {
                            image: "alpine".to_string(),
                            phases: vec![Phase {
                                name: "build".to_string(),
                                commands: vec!["make".to_string()],
                            }],
                            artifacts: ArtifactPaths::default(),
                        },
                    }),
                },
            ],
        )
    }

    async fn setup(environment: ScriptedEnvironment) -> (SourceWatcher, Fakes, PipelineDefinition) {
        let fakes = Fakes::new(environment, FakeFleet::new(&["i-1"], &[]));
        let store = Arc::new(InMemoryStore::new());
        let definition = definition();
        store.insert_definition(&definition).await.unwrap();

        let orchestrator =
            Orchestrator::new(store, fakes.collaborators(), "acme".to_string());
        let watcher = SourceWatcher::new(
            orchestrator,
            fakes.source.clone(),
            Duration::from_secs(60),
        );
        (watcher, fakes, definition)
    }

    #[tokio::test]
    async fn test_first_observation_only_records_commit() {
        let (watcher, _fakes, definition) = setup(ScriptedEnvironment::succeeding()).await;

        assert_eq!(watcher.poll_once().await.unwrap(), 0);
        assert_eq!(watcher.poll_once().await.unwrap(), 0);

        let executions = watcher
            .orchestrator
            .list_executions(definition.id)
            .await
            .unwrap();
        assert!(executions.is_empty());
    }

    #[tokio::test]
    async fn test_new_commit_starts_one_execution() {
        let (watcher, fakes, definition) = setup(ScriptedEnvironment::succeeding()).await;
        watcher.poll_once().await.unwrap();

        fakes.source.set_head("app", "beef42");
        assert_eq!(watcher.poll_once().await.unwrap(), 1);

        let executions = watcher
            .orchestrator
            .list_executions(definition.id)
            .await
            .unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(
            executions[0].trigger,
            Trigger::SourceChange {
                commit: "beef42".to_string()
            }
        );

        // Same commit again does not retrigger, even once the run is over
        crate::testing::wait_until(|| fakes.environment.runs().len() == 1).await;
        assert_eq!(watcher.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_running_pipeline_is_skipped_until_finished() {
        let (watcher, fakes, definition) = setup(ScriptedEnvironment::hanging()).await;
        watcher.poll_once().await.unwrap();

        fakes.source.set_head("app", "beef42");
        assert_eq!(watcher.poll_once().await.unwrap(), 1);

        fakes.source.set_head("app", "f00d99");
        assert_eq!(watcher.poll_once().await.unwrap(), 0);

        let running = watcher
            .orchestrator
            .list_executions(definition.id)
            .await
            .unwrap();
        watcher.orchestrator.cancel(running[0].id).await.unwrap();

        assert_eq!(watcher.poll_once().await.unwrap(), 1);
        let executions = watcher
            .orchestrator
            .list_executions(definition.id)
            .await
            .unwrap();
        assert_eq!(executions.len(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_repository_is_skipped() {
        let (watcher, fakes, _) = setup(ScriptedEnvironment::succeeding()).await;
        let store = watcher.orchestrator.store().clone();
        let mut other = definition();
        other.stages[0].kind = StageKind::Source(SourceConfig {
            repository: "missing".to_string(),
            branch: "main".to_string(),
        });
        store.insert_definition(&other).await.unwrap();

        watcher.poll_once().await.unwrap();
        fakes.source.set_head("app", "beef42");

        assert_eq!(watcher.poll_once().await.unwrap(), 1);
    }
}
