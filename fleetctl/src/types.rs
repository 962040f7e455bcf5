//! Common type definitions shared across the control plane.
//!
//! This module defines:
//! - [`ApprovalId`]: identifier for approval requests, with a short display
//!   format for logs (`apr_xxxxxxxx`)
//! - Risk and capability enums used by the classifier and policy engine
//! - Decision and availability enums used by the approval queue and
//!   capacity-signal pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// A unique identifier for an approval request.
///
/// Serializes as a full UUID; `Display` uses a short, readable format like
/// "apr_abc123xy" for logs and traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct ApprovalId(Uuid);

impl ApprovalId {
    /// Create a new random approval ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Convert to a short, readable string format.
    ///
    /// Takes the first 8 hex characters of the UUID and formats as "apr_xxxxxxxx".
    pub fn to_short_string(&self) -> String {
        let hex = format!("{:032x}", self.0.as_u128());
        format!("apr_{}", &hex[..8])
    }
}

impl Default for ApprovalId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ApprovalId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_short_string())
    }
}

/// Risk classification for a command, from harmless reads to destructive
/// system mutations. Ordered so that `High` and above require approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// What a probe is allowed to do on its host.
///
/// `Observe` is read-only, `Diagnose` may introspect system state, and
/// `Remediate` may mutate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityLevel {
    Observe,
    Diagnose,
    Remediate,
}

impl Default for CapabilityLevel {
    fn default() -> Self {
        CapabilityLevel::Observe
    }
}

impl fmt::Display for CapabilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityLevel::Observe => write!(f, "observe"),
            CapabilityLevel::Diagnose => write!(f, "diagnose"),
            CapabilityLevel::Remediate => write!(f, "remediate"),
        }
    }
}

impl FromStr for CapabilityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "observe" => Ok(CapabilityLevel::Observe),
            "diagnose" => Ok(CapabilityLevel::Diagnose),
            "remediate" => Ok(CapabilityLevel::Remediate),
            other => Err(format!("unknown capability level {other:?}")),
        }
    }
}

/// State of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Pending,
    Approved,
    Denied,
    Expired,
}

impl ApprovalDecision {
    /// Check if this decision represents a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalDecision::Pending)
    }
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalDecision::Pending => write!(f, "pending"),
            ApprovalDecision::Approved => write!(f, "approved"),
            ApprovalDecision::Denied => write!(f, "denied"),
            ApprovalDecision::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for ApprovalDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ApprovalDecision::Pending),
            "approved" => Ok(ApprovalDecision::Approved),
            "denied" => Ok(ApprovalDecision::Denied),
            "expired" => Ok(ApprovalDecision::Expired),
            other => Err(format!("unknown decision {other:?}")),
        }
    }
}

/// Reported availability of the capacity-signal source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Ready,
    Limited,
    Insufficient,
    Degraded,
    Unknown,
}

impl Availability {
    /// Parse a wire value case-insensitively; anything unrecognized maps to
    /// `Unknown` rather than failing the whole snapshot.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "ready" => Availability::Ready,
            "limited" => Availability::Limited,
            "insufficient" => Availability::Insufficient,
            "degraded" => Availability::Degraded,
            _ => Availability::Unknown,
        }
    }
}

impl Default for Availability {
    fn default() -> Self {
        Availability::Unknown
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Ready => write!(f, "ready"),
            Availability::Limited => write!(f, "limited"),
            Availability::Insufficient => write!(f, "insufficient"),
            Availability::Degraded => write!(f, "degraded"),
            Availability::Unknown => write!(f, "unknown"),
        }
    }
}

/// Outcome of a policy evaluation, ranked so that merging two outcomes takes
/// the stricter of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PolicyOutcome {
    Allow,
    Queue,
    Deny,
}

impl PolicyOutcome {
    /// Numeric rank used by the merge rule: allow=1, queue=2, deny=3.
    pub fn rank(&self) -> u8 {
        match self {
            PolicyOutcome::Allow => 1,
            PolicyOutcome::Queue => 2,
            PolicyOutcome::Deny => 3,
        }
    }

    /// Merge with another outcome, keeping the stricter one.
    pub fn merge(self, other: PolicyOutcome) -> PolicyOutcome {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for PolicyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyOutcome::Allow => write!(f, "allow"),
            PolicyOutcome::Queue => write!(f, "queue"),
            PolicyOutcome::Deny => write!(f, "deny"),
        }
    }
}

/// Severity attached to a policy indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_id_short_format() {
        let id = ApprovalId::new();
        let short = id.to_short_string();
        assert!(short.starts_with("apr_"));
        assert_eq!(short.len(), 12);
    }

    #[test]
    fn test_outcome_merge_takes_stricter() {
        assert_eq!(PolicyOutcome::Allow.merge(PolicyOutcome::Queue), PolicyOutcome::Queue);
        assert_eq!(PolicyOutcome::Queue.merge(PolicyOutcome::Allow), PolicyOutcome::Queue);
        assert_eq!(PolicyOutcome::Deny.merge(PolicyOutcome::Queue), PolicyOutcome::Deny);
        assert_eq!(PolicyOutcome::Queue.merge(PolicyOutcome::Deny), PolicyOutcome::Deny);
    }

    #[test]
    fn test_risk_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_availability_parse_is_lenient() {
        assert_eq!(Availability::parse("Ready"), Availability::Ready);
        assert_eq!(Availability::parse("DEGRADED"), Availability::Degraded);
        assert_eq!(Availability::parse("weird"), Availability::Unknown);
    }

    #[test]
    fn test_decision_terminality() {
        assert!(!ApprovalDecision::Pending.is_terminal());
        assert!(ApprovalDecision::Approved.is_terminal());
        assert!(ApprovalDecision::Denied.is_terminal());
        assert!(ApprovalDecision::Expired.is_terminal());
    }
}
