//! Request/response models for the approval endpoints.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// Body of the approval decide endpoint.
///
/// `decision` is kept as free text so validation can distinguish "missing"
/// from "not a valid decision", since the two produce different error messages.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DecideApprovalBody {
    /// "approved" or "denied"
    #[serde(default)]
    pub decision: String,
    /// Operator label recorded on the terminal transition
    #[serde(default)]
    pub decided_by: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ListApprovalsQuery {
    /// Maximum number of entries to return (newest first)
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct WaitDecisionQuery {
    /// Long-poll budget as a humantime string (e.g. "10s"); capped server-side
    pub timeout: Option<String>,
}
