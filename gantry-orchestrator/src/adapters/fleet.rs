//! HTTP fleet manager
//!
//! Talks to a fleet-management service:
//! - `GET {url}/fleets/{selector}/targets` lists current members
//! - `POST {url}/targets/{id}/deliveries` hands one target an artifact

use async_trait::async_trait;
use gantry_core::domain::artifact::Artifact;
use gantry_core::domain::fleet::TargetId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ports::{CollaboratorError, FleetManager};

#[derive(Deserialize)]
struct TargetList {
    targets: Vec<TargetId>,
}

#[derive(Serialize)]
struct Delivery<'a> {
    artifact_id: Uuid,
    producing_stage: &'a str,
    location: &'a str,
}

pub struct HttpFleetManager {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFleetManager {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FleetManager for HttpFleetManager {
    async fn list_targets(&self, selector: &str) -> Result<Vec<TargetId>, CollaboratorError> {
        let url = format!("{}/fleets/{}/targets", self.base_url, selector);
        let list: TargetList = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.targets)
    }

    async fn deliver(
        &self,
        target: &TargetId,
        artifact: &Artifact,
    ) -> Result<(), CollaboratorError> {
        let url = format!("{}/targets/{}/deliveries", self.base_url, target);
        let delivery = Delivery {
            artifact_id: artifact.id,
            producing_stage: &artifact.producing_stage,
            location: &artifact.payload_location,
        };

        self.client
            .post(&url)
            .json(&delivery)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
