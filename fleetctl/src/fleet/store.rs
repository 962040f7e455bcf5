//! In-memory registry of known probes.
//!
//! Tracks each probe's capability policy and, for connected probes, the
//! outbound message channel registered by the transport layer. The
//! [`ChannelSender`] built on top of it is the in-process implementation of
//! the [`CommandSender`] contract.

use crate::dispatch::sender::{CommandSender, MessageType, SendError};
use crate::types::CapabilityLevel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("probe {id} not found")]
    NotFound { id: String },
}

/// Public view of a registered probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProbeState {
    pub id: String,
    pub name: String,
    /// Capability policy currently assigned to the probe.
    pub level: CapabilityLevel,
    pub connected: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// A message queued for delivery to a connected probe.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub message_type: MessageType,
    pub payload: serde_json::Value,
}

struct ProbeEntry {
    state: ProbeState,
    outbound: Option<mpsc::UnboundedSender<OutboundMessage>>,
}

/// Concurrent probe registry.
#[derive(Default)]
pub struct FleetStore {
    probes: DashMap<String, ProbeEntry>,
}

impl FleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a probe. Registration does not connect it.
    pub fn register(&self, id: &str, name: &str, level: CapabilityLevel) -> ProbeState {
        let state = ProbeState {
            id: id.to_string(),
            name: name.to_string(),
            level,
            connected: false,
            last_seen: None,
        };
        self.probes.insert(
            id.to_string(),
            ProbeEntry {
                state: state.clone(),
                outbound: None,
            },
        );
        tracing::info!(probe_id = id, name, level = %level, "probe registered");
        state
    }

    /// Attach an outbound channel for a registered probe, returning the
    /// receiving half the transport drains. Registers the probe on the fly
    /// when it connects before being registered.
    pub fn connect(&self, id: &str) -> mpsc::UnboundedReceiver<OutboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut entry = self.probes.entry(id.to_string()).or_insert_with(|| ProbeEntry {
            state: ProbeState {
                id: id.to_string(),
                name: id.to_string(),
                level: CapabilityLevel::Observe,
                connected: false,
                last_seen: None,
            },
            outbound: None,
        });
        entry.state.connected = true;
        entry.state.last_seen = Some(Utc::now());
        entry.outbound = Some(tx);
        tracing::info!(probe_id = id, "probe connected");
        rx
    }

    pub fn disconnect(&self, id: &str) {
        if let Some(mut entry) = self.probes.get_mut(id) {
            entry.state.connected = false;
            entry.outbound = None;
            tracing::info!(probe_id = id, "probe disconnected");
        }
    }

    /// Record activity from a probe (result ingest, heartbeat).
    pub fn touch(&self, id: &str) {
        if let Some(mut entry) = self.probes.get_mut(id) {
            entry.state.last_seen = Some(Utc::now());
        }
    }

    pub fn get(&self, id: &str) -> Option<ProbeState> {
        self.probes.get(id).map(|entry| entry.state.clone())
    }

    /// Store a new capability policy for the probe.
    pub fn set_policy(&self, id: &str, level: CapabilityLevel) -> Result<(), FleetError> {
        let mut entry = self
            .probes
            .get_mut(id)
            .ok_or_else(|| FleetError::NotFound { id: id.to_string() })?;
        entry.state.level = level;
        tracing::info!(probe_id = id, level = %level, "probe capability policy updated");
        Ok(())
    }

    /// All registered probes, ordered by id.
    pub fn list(&self) -> Vec<ProbeState> {
        let mut probes: Vec<ProbeState> = self
            .probes
            .iter()
            .map(|entry| entry.state.clone())
            .collect();
        probes.sort_by(|a, b| a.id.cmp(&b.id));
        probes
    }

    fn push(&self, id: &str, message: OutboundMessage) -> Result<(), SendError> {
        let entry = self.probes.get(id).ok_or_else(|| SendError::NotConnected {
            probe_id: id.to_string(),
        })?;
        let tx = entry.outbound.as_ref().ok_or_else(|| SendError::NotConnected {
            probe_id: id.to_string(),
        })?;
        tx.send(message).map_err(|_| SendError::ChannelClosed {
            probe_id: id.to_string(),
        })
    }
}

/// [`CommandSender`] over the fleet store's per-probe channels.
pub struct ChannelSender {
    fleet: Arc<FleetStore>,
}

impl ChannelSender {
    pub fn new(fleet: Arc<FleetStore>) -> Self {
        Self { fleet }
    }
}

#[async_trait]
impl CommandSender for ChannelSender {
    async fn send_to(
        &self,
        probe_id: &str,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Result<(), SendError> {
        self.fleet.push(
            probe_id,
            OutboundMessage {
                message_type,
                payload,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_policy_update() {
        let fleet = FleetStore::new();
        fleet.register("probe-a", "edge gateway", CapabilityLevel::Observe);

        assert_eq!(fleet.get("probe-a").unwrap().level, CapabilityLevel::Observe);
        fleet.set_policy("probe-a", CapabilityLevel::Remediate).unwrap();
        assert_eq!(fleet.get("probe-a").unwrap().level, CapabilityLevel::Remediate);

        assert!(matches!(
            fleet.set_policy("ghost", CapabilityLevel::Observe),
            Err(FleetError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_sender_requires_connection() {
        let fleet = Arc::new(FleetStore::new());
        fleet.register("probe-a", "edge gateway", CapabilityLevel::Observe);
        let sender = ChannelSender::new(fleet.clone());

        let err = sender
            .send_to("probe-a", MessageType::Command, json!({"command": "uptime"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::NotConnected { .. }));

        let mut rx = fleet.connect("probe-a");
        sender
            .send_to("probe-a", MessageType::Command, json!({"command": "uptime"}))
            .await
            .unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.message_type, MessageType::Command);
        assert_eq!(message.payload["command"], "uptime");
    }

    #[tokio::test]
    async fn test_disconnect_stops_delivery() {
        let fleet = Arc::new(FleetStore::new());
        let _rx = fleet.connect("probe-a");
        fleet.disconnect("probe-a");

        let sender = ChannelSender::new(fleet.clone());
        let err = sender
            .send_to("probe-a", MessageType::PolicyUpdate, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::NotConnected { .. }));
        assert!(!fleet.get("probe-a").unwrap().connected);
    }

    #[tokio::test]
    async fn test_list_is_ordered() {
        let fleet = FleetStore::new();
        fleet.register("probe-c", "c", CapabilityLevel::Observe);
        fleet.register("probe-a", "a", CapabilityLevel::Observe);
        fleet.register("probe-b", "b", CapabilityLevel::Observe);

        let ids: Vec<String> = fleet.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["probe-a", "probe-b", "probe-c"]);
    }
}
