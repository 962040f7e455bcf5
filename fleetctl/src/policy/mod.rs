//! Capacity-aware command policy: signal providers, thresholds, and the
//! evaluation engine that produces `allow | queue | deny` decisions.

pub mod engine;
pub mod grafana;
pub mod models;
pub mod signals;

pub use engine::{CommandPolicyEngine, POLICY_VERSION};
pub use grafana::{GrafanaProviderConfig, GrafanaSignalProvider, DEFAULT_SNAPSHOT_PATH};
pub use models::{
    CapacitySignals, CapacityThresholds, CommandPolicyDecision, Indicator, PolicyRationale,
};
pub use signals::{CapacitySignalProvider, SignalError, StaticSignalProvider};
