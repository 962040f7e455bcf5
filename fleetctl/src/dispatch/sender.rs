//! The outbound contract toward probe agents.
//!
//! The wire transport itself lives outside this crate; the dispatcher only
//! depends on the narrow [`CommandSender`] capability. The in-process
//! implementation over per-probe channels is in [`crate::fleet::store`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kinds of messages the control plane pushes to probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Command,
    PolicyUpdate,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Command => write!(f, "command"),
            MessageType::PolicyUpdate => write!(f, "policy_update"),
        }
    }
}

/// Errors surfaced by a [`CommandSender`].
#[derive(Debug, Error)]
pub enum SendError {
    #[error("probe {probe_id} not connected")]
    NotConnected { probe_id: String },

    #[error("probe {probe_id} channel closed")]
    ChannelClosed { probe_id: String },

    #[error("encode outbound payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Capability for pushing a message to a single probe.
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send_to(
        &self,
        probe_id: &str,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Result<(), SendError>;
}
