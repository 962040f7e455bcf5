//! Data model for capacity-aware command policy.

use crate::types::{Availability, PolicyOutcome, RiskLevel, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// Live capacity snapshot from the observability source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CapacitySignals {
    /// Label of the system that produced the snapshot.
    pub source: String,
    pub availability: Availability,
    /// Fraction of expected dashboards that are healthy, in [0, 1].
    pub dashboard_coverage: f64,
    /// Fraction of expected queries that succeed, in [0, 1].
    pub query_coverage: f64,
    pub datasource_count: u32,
    /// True when the snapshot could not cover every source.
    #[serde(default)]
    pub partial: bool,
    /// Empty collections are omitted so snapshots stay stable across
    /// producers that drop empty fields entirely.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub panels_by_datasource: HashMap<String, u32>,
}

impl CapacitySignals {
    /// Defensive copy with clamped coverages. Availability is already
    /// normalized at parse time.
    pub fn sanitized(&self) -> Self {
        Self {
            source: self.source.clone(),
            availability: self.availability,
            dashboard_coverage: self.dashboard_coverage.clamp(0.0, 1.0),
            query_coverage: self.query_coverage.clamp(0.0, 1.0),
            datasource_count: self.datasource_count,
            partial: self.partial,
            warnings: self.warnings.clone(),
            panels_by_datasource: self.panels_by_datasource.clone(),
        }
    }
}

/// Thresholds the policy engine evaluates signals against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct CapacityThresholds {
    /// Minimum healthy datasources; values ≤ 0 fall back to 1.
    pub min_datasource_count: i64,
    /// Minimum dashboard coverage; values outside (0, 1] fall back to 0.50.
    pub min_dashboard_coverage: f64,
    /// Minimum query coverage; values outside (0, 1] fall back to 0.25.
    pub min_query_coverage: f64,
}

impl Default for CapacityThresholds {
    fn default() -> Self {
        Self {
            min_datasource_count: 1,
            min_dashboard_coverage: 0.50,
            min_query_coverage: 0.25,
        }
    }
}

impl CapacityThresholds {
    /// Replace out-of-range values with the documented defaults.
    pub fn normalized(&self) -> Self {
        let defaults = Self::default();
        Self {
            min_datasource_count: if self.min_datasource_count <= 0 {
                defaults.min_datasource_count
            } else {
                self.min_datasource_count
            },
            min_dashboard_coverage: if self.min_dashboard_coverage > 0.0
                && self.min_dashboard_coverage <= 1.0
            {
                self.min_dashboard_coverage
            } else {
                defaults.min_dashboard_coverage
            },
            min_query_coverage: if self.min_query_coverage > 0.0 && self.min_query_coverage <= 1.0 {
                self.min_query_coverage
            } else {
                defaults.min_query_coverage
            },
        }
    }
}

/// A single measured signal contributing to a policy decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Indicator {
    pub name: String,
    pub source: String,
    pub observed: String,
    pub comparator: String,
    pub threshold: String,
    pub severity: Severity,
    /// Outcome this indicator contributed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<PolicyOutcome>,
    /// Whether this indicator's effect equals the final outcome.
    pub drove_outcome: bool,
    pub message: String,
}

/// Structured explanation of a policy decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PolicyRationale {
    pub policy_version: String,
    pub summary: String,
    /// True when the decision was made without live capacity signals.
    pub fallback: bool,
    /// Insertion-ordered; summaries depend on the emission order staying
    /// stable.
    pub indicators: Vec<Indicator>,
    pub thresholds: CapacityThresholds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<CapacitySignals>,
}

/// Outcome of evaluating a command against risk and capacity policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CommandPolicyDecision {
    pub outcome: PolicyOutcome,
    pub risk: RiskLevel,
    pub rationale: PolicyRationale,
}

impl CommandPolicyDecision {
    /// Indicators whose effect drove the final outcome.
    pub fn drivers(&self) -> Vec<&Indicator> {
        self.rationale
            .indicators
            .iter()
            .filter(|i| i.drove_outcome)
            .collect()
    }
}
