//! Notification transports
//!
//! `WebhookNotifier` posts each approval notification as JSON to a relay
//! that fans it out to the listed addresses. `LogNotifier` only writes the
//! notification to the log and is used when no relay is configured.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::ports::{CollaboratorError, Notification, NotificationTransport};

/// Topic -> subscribed addresses
pub type RecipientDirectory = HashMap<String, Vec<String>>;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    topic: &'a str,
    recipients: &'a [String],
    subject: &'a str,
    body: &'a str,
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    directory: RecipientDirectory,
}

impl WebhookNotifier {
    pub fn new(url: String, directory: RecipientDirectory) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            directory,
        }
    }
}

#[async_trait]
impl NotificationTransport for WebhookNotifier {
    async fn recipients(&self, topic: &str) -> Result<Vec<String>, CollaboratorError> {
        Ok(self.directory.get(topic).cloned().unwrap_or_default())
    }

    async fn send(
        &self,
        recipients: &[String],
        notification: &Notification,
    ) -> Result<(), CollaboratorError> {
        let payload = WebhookPayload {
            topic: &notification.topic,
            recipients,
            subject: &notification.subject,
            body: &notification.body,
        };

        debug!(
            "Posting notification '{}' for {} recipient(s)",
            notification.subject,
            recipients.len()
        );

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

pub struct LogNotifier {
    directory: RecipientDirectory,
}

impl LogNotifier {
    pub fn new(directory: RecipientDirectory) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl NotificationTransport for LogNotifier {
    async fn recipients(&self, topic: &str) -> Result<Vec<String>, CollaboratorError> {
        Ok(self.directory.get(topic).cloned().unwrap_or_default())
    }

    async fn send(
        &self,
        recipients: &[String],
        notification: &Notification,
    ) -> Result<(), CollaboratorError> {
        info!(
            "Notification to {}: {}\n{}",
            recipients.join(", "),
            notification.subject,
            notification.body
        );
        Ok(())
    }
}
