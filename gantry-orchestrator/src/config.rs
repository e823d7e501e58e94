//! Orchestrator configuration
//!
//! Everything is read from the environment with development defaults, then
//! checked by `validate` before anything is started.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::adapters::RecipientDirectory;

#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix for container names and notification subjects
    pub project: String,

    /// Postgres URL; the in-memory store is used when unset
    pub database_url: Option<String>,

    pub bind_addr: String,

    /// Where source snapshots, workspaces and build outputs are kept
    pub artifact_root: PathBuf,

    /// Where build logs are written
    pub log_root: PathBuf,

    /// How often source repositories are checked for new commits
    pub source_poll_interval: Duration,

    /// Notification relay; notifications are only logged when unset
    pub notify_webhook: Option<String>,

    /// Approval topic -> recipient addresses
    pub approval_recipients: RecipientDirectory,

    /// Fleet-management service base URL
    pub fleet_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: "gantry".to_string(),
            database_url: None,
            bind_addr: "0.0.0.0:8080".to_string(),
            artifact_root: PathBuf::from("/var/lib/gantry"),
            log_root: PathBuf::from("/var/log/gantry"),
            source_poll_interval: Duration::from_secs(60),
            notify_webhook: None,
            approval_recipients: HashMap::new(),
            fleet_url: "http://localhost:9400".to_string(),
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Recognized variables (all optional):
    /// - GANTRY_PROJECT (default: gantry)
    /// - DATABASE_URL
    /// - ORCHESTRATOR_BIND_ADDR (default: 0.0.0.0:8080)
    /// - GANTRY_ARTIFACT_ROOT (default: /var/lib/gantry)
    /// - GANTRY_LOG_ROOT (default: /var/log/gantry)
    /// - GANTRY_SOURCE_POLL_INTERVAL (seconds, default: 60)
    /// - GANTRY_NOTIFY_WEBHOOK
    /// - GANTRY_APPROVAL_RECIPIENTS (`topic=a@x,b@y;other=c@z`)
    /// - GANTRY_FLEET_URL (default: http://localhost:9400)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let source_poll_interval = match var("GANTRY_SOURCE_POLL_INTERVAL") {
            Some(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|_| {
                anyhow::anyhow!("GANTRY_SOURCE_POLL_INTERVAL must be a number of seconds")
            })?),
            None => defaults.source_poll_interval,
        };

        let approval_recipients = match var("GANTRY_APPROVAL_RECIPIENTS") {
            Some(raw) => parse_recipients(&raw)?,
            None => defaults.approval_recipients,
        };

        Ok(Self {
            project: var("GANTRY_PROJECT").unwrap_or(defaults.project),
            database_url: var("DATABASE_URL"),
            bind_addr: var("ORCHESTRATOR_BIND_ADDR").unwrap_or(defaults.bind_addr),
            artifact_root: var("GANTRY_ARTIFACT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_root),
            log_root: var("GANTRY_LOG_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_root),
            source_poll_interval,
            notify_webhook: var("GANTRY_NOTIFY_WEBHOOK"),
            approval_recipients,
            fleet_url: var("GANTRY_FLEET_URL").unwrap_or(defaults.fleet_url),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project.is_empty()
            || !self
                .project
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!("project must be non-empty and contain only [A-Za-z0-9_-]");
        }

        if self.source_poll_interval.as_secs() == 0 {
            anyhow::bail!("source_poll_interval must be greater than 0");
        }

        if !is_http_url(&self.fleet_url) {
            anyhow::bail!("fleet_url must start with http:// or https://");
        }

        if let Some(webhook) = &self.notify_webhook {
            if !is_http_url(webhook) {
                anyhow::bail!("notify_webhook must start with http:// or https://");
            }
        }

        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Parses `topic=a@x,b@y;other=c@z` into a recipient directory
pub fn parse_recipients(raw: &str) -> anyhow::Result<RecipientDirectory> {
    let mut directory = RecipientDirectory::new();

    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (topic, addresses) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected topic=addresses, got '{}'", entry))?;

        let topic = topic.trim();
        if topic.is_empty() {
            anyhow::bail!("empty topic in '{}'", entry);
        }

        let addresses: Vec<String> = addresses
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();

        directory.entry(topic.to_string()).or_default().extend(addresses);
    }

    Ok(directory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source_poll_interval, Duration::from_secs(60));
        assert!(config.database_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.project = "my project".to_string();
        assert!(config.validate().is_err());
        config.project = "acme-web".to_string();

        config.fleet_url = "fleet.local".to_string();
        assert!(config.validate().is_err());
        config.fleet_url = "https://fleet.local".to_string();

        config.notify_webhook = Some("ftp://relay".to_string());
        assert!(config.validate().is_err());
        config.notify_webhook = Some("https://relay.local/hooks/approvals".to_string());

        config.source_poll_interval = Duration::from_secs(0);
        assert!(config.validate().is_err());
        config.source_poll_interval = Duration::from_secs(5);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_recipients() {
        let directory =
            parse_recipients("releases=ops@example.com, lead@example.com; hotfix=oncall@example.com;")
                .unwrap();

        assert_eq!(
            directory.get("releases"),
            Some(&vec![
                "ops@example.com".to_string(),
                "lead@example.com".to_string()
            ])
        );
        assert_eq!(
            directory.get("hotfix"),
            Some(&vec!["oncall@example.com".to_string()])
        );
    }

    #[test]
    fn test_parse_recipients_rejects_malformed_entries() {
        assert!(parse_recipients("releases").is_err());
        assert!(parse_recipients("=ops@example.com").is_err());
        assert!(parse_recipients("").unwrap().is_empty());
    }
}
