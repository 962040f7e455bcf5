//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The configuration file path defaults to `config.yaml` but can
//! be specified via `-f` flag or the `FLEETCTL_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Sources are merged in the following order (later sources override earlier
//! ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `FLEETCTL_`
//!
//! For nested values, use double underscores in environment variables:
//! `FLEETCTL_APPROVALS__CAPACITY=50` sets `approvals.capacity`.
//!
//! Durations accept humantime strings (`"500ms"`, `"10m"`, `"24h"`).

use clap::Parser;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::approvals::queue::ApprovalQueueConfig;
use crate::fleet::templates::PolicyTemplate;
use crate::policy::grafana::DEFAULT_SNAPSHOT_PATH;
use crate::policy::models::{CapacitySignals, CapacityThresholds};

/// Simple CLI args - config file selection plus run-mode switches.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "FLEETCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,

    /// Serve the MCP tool surface over stdio instead of the HTTP API.
    #[arg(long)]
    pub mcp: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Approval queue tuning
    pub approvals: ApprovalsConfig,
    /// Command dispatch tuning
    pub dispatch: DispatchConfig,
    /// Capacity policy thresholds and signal source
    pub capacity: CapacityConfig,
    /// Policy templates seeded into the template store at startup
    pub policy_templates: Vec<PolicyTemplate>,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            approvals: ApprovalsConfig::default(),
            dispatch: DispatchConfig::default(),
            capacity: CapacityConfig::default(),
            policy_templates: Vec::new(),
            enable_otel_export: false,
        }
    }
}

/// Approval queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApprovalsConfig {
    /// Maximum number of live (pending, unexpired) approval requests
    pub capacity: usize,
    /// How long a request stays decidable after submission
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// How long terminal requests are retained for audit listing
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
    /// How often the reaper evicts expired and stale entries
    #[serde(with = "humantime_serde")]
    pub reaper_interval: Duration,
    /// Polling cadence for decision waits
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Default long-poll budget for decision-wait endpoints
    #[serde(with = "humantime_serde")]
    pub wait_timeout: Duration,
}

impl Default for ApprovalsConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl: Duration::from_secs(600),
            retention: Duration::from_secs(24 * 60 * 60),
            reaper_interval: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            wait_timeout: Duration::from_secs(60),
        }
    }
}

impl ApprovalsConfig {
    pub fn queue_config(&self) -> ApprovalQueueConfig {
        ApprovalQueueConfig {
            capacity: self.capacity,
            ttl: self.ttl,
            retention: self.retention,
            poll_interval: self.poll_interval,
        }
    }
}

/// Command dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Default wait budget when the caller does not pick one
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Tracked commands older than this are treated as abandoned
    #[serde(with = "humantime_serde")]
    pub tracker_ttl: Duration,
    /// How often the tracker sweeper runs
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            tracker_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Capacity policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapacityConfig {
    /// Thresholds the policy engine evaluates signals against
    pub thresholds: CapacityThresholds,
    /// Grafana-style capacity source; omit to run risk-only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grafana: Option<GrafanaConfig>,
    /// Fixed signals for environments without an observability source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_signals: Option<CapacitySignals>,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            thresholds: CapacityThresholds::default(),
            grafana: None,
            static_signals: None,
        }
    }
}

/// Connection settings for the Grafana capacity source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GrafanaConfig {
    pub base_url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    #[serde(default = "default_grafana_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_grafana_source")]
    pub source: String,
}

fn default_snapshot_path() -> String {
    DEFAULT_SNAPSHOT_PATH.to_string()
}

fn default_grafana_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_grafana_source() -> String {
    "grafana".to_string()
}

impl Config {
    /// Load configuration from the YAML file and `FLEETCTL_` environment
    /// overrides.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let config: Config = Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("FLEETCTL_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity checks beyond what deserialization enforces.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.approvals.capacity > 0, "approvals.capacity must be positive");
        anyhow::ensure!(!self.approvals.ttl.is_zero(), "approvals.ttl must be positive");
        anyhow::ensure!(
            !self.approvals.poll_interval.is_zero(),
            "approvals.poll_interval must be positive"
        );
        anyhow::ensure!(
            !self.dispatch.tracker_ttl.is_zero(),
            "dispatch.tracker_ttl must be positive"
        );

        let mut seen = std::collections::HashSet::new();
        for template in &self.policy_templates {
            anyhow::ensure!(
                seen.insert(template.id.as_str()),
                "duplicate policy template id {:?}",
                template.id
            );
        }
        Ok(())
    }
}
