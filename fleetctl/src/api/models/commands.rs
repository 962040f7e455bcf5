//! Request models for the command invoke endpoint.

use crate::types::CapabilityLevel;
use serde::Deserialize;
use std::time::Duration;
use utoipa::ToSchema;

/// Body of the command invoke endpoint.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InvokeCommandRequest {
    /// The command to run on the probe
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Caller-supplied request id; generated when omitted
    #[serde(default)]
    pub request_id: String,
    /// Capability level the command claims; defaults to the probe's level
    #[serde(default)]
    pub level: Option<CapabilityLevel>,
    /// Stream output as it is produced
    #[serde(default)]
    pub stream: bool,
    /// Block until the probe responds
    #[serde(default)]
    pub wait: bool,
    /// Wait budget; defaults to the configured dispatch timeout
    #[serde(default, with = "humantime_serde")]
    #[schema(value_type = Option<String>, example = "30s")]
    pub timeout: Option<Duration>,
    /// Justification recorded when the command needs approval
    #[serde(default)]
    pub reason: String,
    /// Requester label recorded when the command needs approval
    #[serde(default)]
    pub requested_by: String,
    /// When queued for approval, block until the decision instead of
    /// returning the queued snapshot immediately
    #[serde(default)]
    pub wait_for_approval: bool,
}
