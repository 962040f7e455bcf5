//! Capacity-aware command policy evaluation.
//!
//! Combines the pure risk classification with a live capacity snapshot into
//! an `allow | queue | deny` decision. Every input is reported as an
//! [`Indicator`] in a fixed emission order so rationale summaries are stable;
//! the final outcome is the strictest effect any indicator contributed.

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::approvals::risk::classify_risk;
use crate::dispatch::CommandPayload;
use crate::types::{Availability, CapabilityLevel, PolicyOutcome, RiskLevel, Severity};

use super::models::{
    CapacitySignals, CapacityThresholds, CommandPolicyDecision, Indicator, PolicyRationale,
};
use super::signals::CapacitySignalProvider;

/// Version tag stamped into every rationale.
pub const POLICY_VERSION: &str = "capacity-policy/v1";

/// Evaluates commands against risk and capacity policy.
pub struct CommandPolicyEngine {
    provider: Arc<dyn CapacitySignalProvider>,
    thresholds: ArcSwap<CapacityThresholds>,
}

impl CommandPolicyEngine {
    pub fn new(provider: Arc<dyn CapacitySignalProvider>, thresholds: CapacityThresholds) -> Self {
        Self {
            provider,
            thresholds: ArcSwap::from_pointee(thresholds),
        }
    }

    /// Swap in new thresholds; in-flight evaluations keep the set they
    /// loaded.
    pub fn set_thresholds(&self, thresholds: CapacityThresholds) {
        self.thresholds.store(Arc::new(thresholds));
    }

    pub fn thresholds(&self) -> CapacityThresholds {
        **self.thresholds.load()
    }

    /// Evaluate a command for a probe at `probe_level`.
    ///
    /// `probe_level` is carried through the signature for future per-probe
    /// policy and is not consulted today.
    pub async fn evaluate_command_policy(
        &self,
        cmd: &CommandPayload,
        probe_level: CapabilityLevel,
    ) -> CommandPolicyDecision {
        let _ = probe_level;
        let thresholds = self.thresholds().normalized();
        let risk = classify_risk(&cmd.command, &cmd.args, cmd.level);

        let mut outcome = PolicyOutcome::Allow;
        let mut indicators: Vec<Indicator> = Vec::new();

        let risky = risk >= RiskLevel::High;
        if risky {
            outcome = outcome.merge(PolicyOutcome::Queue);
        }
        indicators.push(Indicator {
            name: "command_risk".to_string(),
            source: "risk_classifier".to_string(),
            observed: risk.to_string(),
            comparator: ">=".to_string(),
            threshold: RiskLevel::High.to_string(),
            severity: if risky { Severity::Warn } else { Severity::Info },
            effect: risky.then_some(PolicyOutcome::Queue),
            drove_outcome: false,
            message: if risky {
                format!("command risk {risk} requires operator approval")
            } else {
                format!("command risk {risk} within autonomous limits")
            },
        });

        let signals = match self.provider.capacity_signals().await {
            Ok(Some(signals)) => Some(signals.sanitized()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "capacity signal provider failed; evaluating on risk only");
                None
            }
        };

        let Some(signals) = signals else {
            indicators.push(Indicator {
                name: "capacity_signals".to_string(),
                source: "capacity_provider".to_string(),
                observed: "unavailable".to_string(),
                comparator: "==".to_string(),
                threshold: "available".to_string(),
                severity: Severity::Info,
                effect: None,
                drove_outcome: false,
                message: "capacity signals unavailable; policy evaluated on command risk only"
                    .to_string(),
            });
            return finalize(outcome, risk, indicators, thresholds, None, true);
        };

        // Availability: degraded denies outright, constrained merges to queue.
        let availability_effect = match signals.availability {
            Availability::Degraded => Some(PolicyOutcome::Deny),
            Availability::Limited | Availability::Insufficient => Some(PolicyOutcome::Queue),
            Availability::Ready | Availability::Unknown => None,
        };
        if let Some(effect) = availability_effect {
            outcome = outcome.merge(effect);
        }
        indicators.push(Indicator {
            name: "availability".to_string(),
            source: signals.source.clone(),
            observed: signals.availability.to_string(),
            comparator: "==".to_string(),
            threshold: Availability::Ready.to_string(),
            severity: match availability_effect {
                Some(PolicyOutcome::Deny) => Severity::Critical,
                Some(_) => Severity::Warn,
                None => Severity::Info,
            },
            effect: availability_effect,
            drove_outcome: false,
            message: match availability_effect {
                Some(PolicyOutcome::Deny) => {
                    format!("capacity availability {}; command denied", signals.availability)
                }
                Some(_) => format!(
                    "capacity availability {}; command queued for approval",
                    signals.availability
                ),
                None => format!("capacity availability {}", signals.availability),
            },
        });

        // Datasource count below the floor is a hard deny.
        let min_datasources = thresholds.min_datasource_count;
        let starved = (signals.datasource_count as i64) < min_datasources;
        if starved {
            outcome = outcome.merge(PolicyOutcome::Deny);
        }
        indicators.push(Indicator {
            name: "datasource_count".to_string(),
            source: signals.source.clone(),
            observed: signals.datasource_count.to_string(),
            comparator: ">=".to_string(),
            threshold: min_datasources.to_string(),
            severity: if starved { Severity::Critical } else { Severity::Info },
            effect: starved.then_some(PolicyOutcome::Deny),
            drove_outcome: false,
            message: if starved {
                format!(
                    "only {} datasources available (minimum {min_datasources})",
                    signals.datasource_count
                )
            } else {
                format!(
                    "datasource count {} meets minimum {min_datasources}",
                    signals.datasource_count
                )
            },
        });

        // Coverage ratios only participate when the snapshot measured them.
        if signals.dashboard_coverage > 0.0 {
            let low = signals.dashboard_coverage < thresholds.min_dashboard_coverage;
            if low {
                outcome = outcome.merge(PolicyOutcome::Queue);
            }
            indicators.push(coverage_indicator(
                "dashboard_coverage",
                &signals.source,
                signals.dashboard_coverage,
                thresholds.min_dashboard_coverage,
                low,
            ));
        }
        if signals.query_coverage > 0.0 {
            let low = signals.query_coverage < thresholds.min_query_coverage;
            if low {
                outcome = outcome.merge(PolicyOutcome::Queue);
            }
            indicators.push(coverage_indicator(
                "query_coverage",
                &signals.source,
                signals.query_coverage,
                thresholds.min_query_coverage,
                low,
            ));
        }

        if signals.partial {
            indicators.push(Indicator {
                name: "partial_snapshot".to_string(),
                source: signals.source.clone(),
                observed: "partial".to_string(),
                comparator: "==".to_string(),
                threshold: "complete".to_string(),
                severity: Severity::Info,
                effect: None,
                drove_outcome: false,
                message: "capacity snapshot is partial; thresholds evaluated on available data"
                    .to_string(),
            });
        }

        finalize(outcome, risk, indicators, thresholds, Some(signals), false)
    }
}

fn coverage_indicator(
    name: &str,
    source: &str,
    observed: f64,
    threshold: f64,
    low: bool,
) -> Indicator {
    Indicator {
        name: name.to_string(),
        source: source.to_string(),
        observed: format!("{observed:.2}"),
        comparator: ">=".to_string(),
        threshold: format!("{threshold:.2}"),
        severity: if low { Severity::Warn } else { Severity::Info },
        effect: low.then_some(PolicyOutcome::Queue),
        drove_outcome: false,
        message: if low {
            format!("{name} {observed:.2} below threshold {threshold:.2}")
        } else {
            format!("{name} {observed:.2} meets threshold {threshold:.2}")
        },
    }
}

/// Stamp driver flags and derive the summary from the indicators that drove
/// the outcome.
fn finalize(
    outcome: PolicyOutcome,
    risk: RiskLevel,
    mut indicators: Vec<Indicator>,
    thresholds: CapacityThresholds,
    signals: Option<CapacitySignals>,
    fallback: bool,
) -> CommandPolicyDecision {
    for indicator in &mut indicators {
        indicator.drove_outcome = indicator.effect == Some(outcome);
    }

    let driver_messages: Vec<&str> = indicators
        .iter()
        .filter(|i| i.drove_outcome)
        .map(|i| i.message.as_str())
        .collect();
    let summary = if driver_messages.is_empty() {
        "no policy constraints triggered; command allowed".to_string()
    } else {
        driver_messages.join("; ")
    };

    CommandPolicyDecision {
        outcome,
        risk,
        rationale: PolicyRationale {
            policy_version: POLICY_VERSION.to_string(),
            summary,
            fallback,
            indicators,
            thresholds,
            signals,
        },
    }
}
