//! Control-plane client
//!
//! The control plane owns VM scheduling and executes workload drains; this
//! client only asks it to start draining a node. Configure with
//! `CONTROL_PLANE_URL`; when unset the client is absent and the
//! maintenance coordinator falls back to its logged dev drain timer.
//!
//! Drain completion flows back the other way, as `drain-progress` posts
//! from the control plane to this server.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Request asking the control plane to drain a node.
#[derive(Debug, Clone, Serialize)]
pub struct DrainNodeRequest {
    pub node_id: String,
    /// Where drain progress should be reported back
    pub callback_url: String,
}

pub struct ControlPlaneClient {
    client: Client,
    base_url: String,
}

impl ControlPlaneClient {
    /// Build a client for the configured base URL, or `None` when no
    /// control plane is configured.
    pub fn from_config(base_url: Option<&str>) -> Option<Self> {
        let base_url = base_url?.trim_end_matches('/').to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .ok()?;

        Some(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the control plane to start draining a node.
    pub async fn notify_drain(&self, request: DrainNodeRequest) -> Result<()> {
        let url = format!("{}/api/v1/nodes/{}/drain", self.base_url, request.node_id);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send drain notification")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Drain notification failed with status {}: {}", status, body);
        }

        Ok(())
    }
}
