//! Data model for the approval pipeline.

use crate::dispatch::CommandPayload;
use crate::types::{ApprovalDecision, ApprovalId, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A pending (or decided) request for a human to approve a risky command.
///
/// Once `decision` leaves `Pending` it never changes again. `decided_by` and
/// `decided_at` are set exactly when an operator makes the terminal call;
/// expired requests carry neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    /// The probe the command targets.
    pub probe_id: String,
    /// The command that will be dispatched if approved.
    pub command: CommandPayload,
    /// Free-text justification supplied by the requester.
    pub reason: String,
    pub risk: RiskLevel,
    pub requested_by: String,
    pub decision: ApprovalDecision,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn is_terminal(&self) -> bool {
        self.decision.is_terminal()
    }

    /// Whether the request is past its decision deadline.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// A request counts against queue capacity while pending and unexpired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.decision == ApprovalDecision::Pending && !self.is_past_expiry(now)
    }

    /// When the request reached a terminal state, for retention purposes.
    ///
    /// Expired requests transition lazily, so their terminal time is the
    /// expiry deadline rather than the eviction tick that noticed it.
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        match self.decision {
            ApprovalDecision::Pending => None,
            ApprovalDecision::Approved | ApprovalDecision::Denied => self.decided_at,
            ApprovalDecision::Expired => Some(self.expires_at),
        }
    }
}
