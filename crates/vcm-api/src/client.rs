//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "HTTP client for the status relay."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::debug;
use vcm_telemetry::ChargerStatus;

use crate::{ErrorResponse, HealthResponse, StatusView};

/// What the relay currently holds.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayStatus {
    Fresh(StatusView),
    /// A status exists but is too old to be served.
    Stale,
    Empty,
}

/// Authenticated client for one relay.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl RelayClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_status(&self) -> Result<RelayStatus> {
        let url = format!("{}/", self.base_url);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .with_context(|| format!("failed to reach relay at {url}"))?;
        let body: Value = checked(response)
            .await?
            .json()
            .await
            .context("relay returned an unreadable status body")?;
        parse_status(body)
    }

    pub async fn publish(&self, status: &ChargerStatus) -> Result<()> {
        let url = format!("{}/api/update_battery_status", self.base_url);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(status)
            .send()
            .await
            .with_context(|| format!("failed to reach relay at {url}"))?;
        checked(response).await?;
        debug!(url = %url, "status published");
        Ok(())
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/api/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach relay at {url}"))?;
        checked(response)
            .await?
            .json()
            .await
            .context("relay returned an unreadable health body")
    }
}

/// Turn non-success responses into errors carrying the relay's message.
async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(anyhow!("relay responded {status}: {message}"))
}

fn parse_status(body: Value) -> Result<RelayStatus> {
    match &body {
        Value::Null => return Ok(RelayStatus::Stale),
        Value::Object(map) if map.get("status").and_then(Value::as_str) == Some("empty_db") => {
            return Ok(RelayStatus::Empty)
        }
        _ => {}
    }
    let view = serde_json::from_value(body).context("relay returned an unexpected status")?;
    Ok(RelayStatus::Fresh(view))
}
