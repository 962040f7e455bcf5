//! Request/response models for the probe endpoints.

use crate::fleet::templates::PolicyTemplate;
use crate::types::CapabilityLevel;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterProbeRequest {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub level: CapabilityLevel,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ApplyPolicyRequest {
    /// Id of the policy template to apply
    pub policy_id: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PolicyApplicationResponse {
    pub template: PolicyTemplate,
    /// False when the template was stored but the push to the probe failed
    pub pushed: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IngestResultResponse {
    /// Whether a waiter consumed the result
    pub delivered: bool,
}
