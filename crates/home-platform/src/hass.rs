//! Home Assistant REST bridge

use crate::entity::{EntityId, EntityState};
use crate::platform::PlatformHub;
use crate::service::{Outbound, ServiceCall};
use chrono::{DateTime, FixedOffset, Local};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Bridge errors
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },
}

/// State object as returned by `GET /api/states`
#[derive(Debug, Deserialize)]
struct RawState {
    entity_id: String,
    state: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    last_changed: DateTime<FixedOffset>,
}

impl From<RawState> for EntityState {
    fn from(raw: RawState) -> Self {
        Self {
            entity_id: EntityId::new(raw.entity_id),
            state: raw.state,
            attributes: raw.attributes,
            last_changed: raw.last_changed.with_timezone(&Local).naive_local(),
        }
    }
}

/// Minimal Home Assistant REST client
#[derive(Debug, Clone)]
pub struct HassClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HassClient {
    /// Create a client for `base_url` (e.g., "http://homeassistant.local:8123")
    pub fn new(base_url: &str, token: &str) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Fetch every entity state
    pub async fn get_states(&self) -> Result<Vec<EntityState>, PlatformError> {
        let url = format!("{}/api/states", self.base_url);
        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;
        if !response.status().is_success() {
            return Err(PlatformError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        let raw: Vec<RawState> = response.json().await?;
        Ok(raw.into_iter().map(EntityState::from).collect())
    }

    /// Invoke a service
    pub async fn call_service(&self, call: &ServiceCall) -> Result<(), PlatformError> {
        let url = format!(
            "{}/api/services/{}/{}",
            self.base_url, call.domain, call.service
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&call.data)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PlatformError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        Ok(())
    }

    async fn deliver(&self, outbound: Outbound) -> Result<(), PlatformError> {
        match outbound {
            Outbound::Service(call) => self.call_service(&call).await,
            Outbound::Notify(notification) => {
                for call in notification.into_service_calls() {
                    self.call_service(&call).await?;
                }
                Ok(())
            }
        }
    }
}

/// Refresh the hub from `/api/states` every `interval`
pub fn spawn_state_poller(client: HassClient, hub: PlatformHub, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match client.get_states().await {
                Ok(states) => {
                    let changed = states
                        .into_iter()
                        .filter_map(|s| hub.update_state(s))
                        .count();
                    if changed > 0 {
                        tracing::debug!("Polled platform: {} entities changed", changed);
                    }
                }
                Err(e) => tracing::warn!("Failed to poll platform states: {}", e),
            }
        }
    })
}

/// Deliver queued commands until the hub is dropped
pub fn spawn_outbound_sender(
    client: HassClient,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            if let Err(e) = client.deliver(outbound).await {
                tracing::error!("Failed to deliver platform command: {}", e);
            }
        }
        tracing::info!("Outbound queue closed");
    })
}
