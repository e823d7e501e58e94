use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod adapters;
pub mod api;
pub mod config;
pub mod db;
pub mod ports;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod stage;

#[cfg(test)]
mod testing;

use crate::adapters::{
    GitSourceControl, HttpFleetManager, LogNotifier, PodmanEnvironment, WebhookNotifier,
};
use crate::config::Config;
use crate::ports::{Collaborators, NotificationTransport};
use crate::repository::{InMemoryStore, PgStore, Store};
use crate::scheduler::SourceWatcher;
use crate::service::Orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gantry Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        "Project: {}, artifacts: {}, logs: {}",
        config.project,
        config.artifact_root.display(),
        config.log_root.display()
    );

    let store: Arc<dyn Store> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url)
                .await
                .context("Failed to create database pool")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state is kept in memory only");
            Arc::new(InMemoryStore::new())
        }
    };

    if let Err(e) = adapters::check_podman_available() {
        tracing::warn!("Builds will fail until podman is available: {:#}", e);
    }

    let notifier: Arc<dyn NotificationTransport> = match &config.notify_webhook {
        Some(url) => Arc::new(WebhookNotifier::new(
            url.clone(),
            config.approval_recipients.clone(),
        )),
        None => {
            tracing::warn!("GANTRY_NOTIFY_WEBHOOK not set, approval notifications are only logged");
            Arc::new(LogNotifier::new(config.approval_recipients.clone()))
        }
    };

    let collaborators = Collaborators {
        source: Arc::new(GitSourceControl::new(&config.artifact_root)),
        environment: Arc::new(PodmanEnvironment::new(
            config.project.clone(),
            config.artifact_root.clone(),
            config.log_root.clone(),
        )),
        notifier,
        fleet: Arc::new(HttpFleetManager::new(config.fleet_url.clone())),
    };

    let orchestrator = Orchestrator::new(store, collaborators.clone(), config.project.clone());

    // Nothing survives a restart: settle what the last process left open
    let recovery = orchestrator
        .recover()
        .await
        .context("Failed to settle state from a previous run")?;
    tracing::info!(
        "Recovered: {} execution(s) failed, {} approval(s) superseded",
        recovery.failed_executions,
        recovery.superseded_approvals
    );

    let watcher = SourceWatcher::new(
        orchestrator.clone(),
        collaborators.source.clone(),
        config.source_poll_interval,
    );
    tokio::spawn(async move { watcher.run().await });

    // Build router with all API endpoints
    let app = api::create_router(api::AppState::new(orchestrator));

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
