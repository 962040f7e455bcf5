//! Grafana-backed capacity signal provider.
//!
//! Reads a capacity snapshot document from a Grafana instance (or anything
//! that serves the same shape) and maps it onto [`CapacitySignals`].
//! Unreachable or snapshot-less sources report as unavailable rather than
//! erroring, so policy can fall back to risk-only evaluation.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::types::Availability;

use super::models::CapacitySignals;
use super::signals::{CapacitySignalProvider, SignalError};

/// Default path the snapshot document is served from.
pub const DEFAULT_SNAPSHOT_PATH: &str = "/api/capacity/snapshot";

/// Snapshot document as served by the observability source. Field names and
/// omission rules match what the dashboards export, so this is looser than
/// [`CapacitySignals`]: availability is free text and coverages may be
/// missing entirely.
#[derive(Debug, Deserialize)]
struct RawCapacitySnapshot {
    #[serde(default)]
    availability: String,
    #[serde(default)]
    dashboard_coverage: f64,
    #[serde(default)]
    query_coverage: f64,
    #[serde(default)]
    datasource_count: u32,
    #[serde(default)]
    partial: bool,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    panels_by_datasource: HashMap<String, u32>,
}

/// Configuration for the Grafana adapter.
#[derive(Debug, Clone)]
pub struct GrafanaProviderConfig {
    pub base_url: Url,
    pub api_token: Option<String>,
    pub snapshot_path: String,
    pub timeout: Duration,
    /// Label stamped into the snapshots this provider produces.
    pub source: String,
}

/// Capacity signals read from a Grafana HTTP API.
pub struct GrafanaSignalProvider {
    client: reqwest::Client,
    config: GrafanaProviderConfig,
}

impl GrafanaSignalProvider {
    pub fn new(config: GrafanaProviderConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn snapshot_url(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.as_str().trim_end_matches('/'),
            self.config.snapshot_path
        )
    }
}

#[async_trait]
impl CapacitySignalProvider for GrafanaSignalProvider {
    async fn capacity_signals(&self) -> Result<Option<CapacitySignals>, SignalError> {
        let mut request = self.client.get(self.snapshot_url());
        if let Some(token) = &self.config.api_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                // Connection-level failures mean "no signals", not a policy
                // error.
                tracing::debug!(error = %e, "capacity source unreachable");
                return Ok(None);
            }
        };

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(SignalError::Query(format!(
                    "capacity source returned HTTP {status}"
                )));
            }
            _ => {}
        }

        let raw: RawCapacitySnapshot = response
            .json()
            .await
            .map_err(|e| SignalError::Malformed(e.to_string()))?;

        let signals = CapacitySignals {
            source: self.config.source.clone(),
            availability: Availability::parse(&raw.availability),
            dashboard_coverage: raw.dashboard_coverage,
            query_coverage: raw.query_coverage,
            datasource_count: raw.datasource_count,
            partial: raw.partial,
            warnings: raw.warnings,
            panels_by_datasource: raw.panels_by_datasource,
        }
        .sanitized();

        Ok(Some(signals))
    }
}
