//! Per-request tracking of in-flight commands.
//!
//! Every request/response dispatch registers here before the send so a probe
//! response always has somewhere to land. The result slot has capacity 1,
//! so delivery succeeds even when the waiter is slow, and a given request id
//! is completed or canceled at most once.

use crate::types::CapabilityLevel;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::models::CommandResult;

/// Internal record for a tracked request. Holds the sending half of the
/// result slot; the receiving half lives in the [`PendingCommand`] handle.
struct TrackedCommand {
    probe_id: String,
    created_at: Instant,
    tx: mpsc::Sender<CommandResult>,
}

/// Caller-side handle for a tracked request.
///
/// `wait` consumes the single result; `None` means the tracker entry was
/// canceled before a result arrived.
pub struct PendingCommand {
    pub request_id: String,
    pub probe_id: String,
    pub command: String,
    pub level: CapabilityLevel,
    rx: mpsc::Receiver<CommandResult>,
}

impl PendingCommand {
    pub async fn wait(&mut self) -> Option<CommandResult> {
        self.rx.recv().await
    }
}

/// Registry of commands awaiting a probe response.
#[derive(Default)]
pub struct CommandTracker {
    pending: Mutex<HashMap<String, TrackedCommand>>,
}

impl CommandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and return the handle that will observe its result.
    ///
    /// Re-tracking an id replaces (and thereby cancels) the previous entry.
    pub fn track(
        &self,
        request_id: &str,
        probe_id: &str,
        command: &str,
        level: CapabilityLevel,
    ) -> PendingCommand {
        let (tx, rx) = mpsc::channel(1);
        let record = TrackedCommand {
            probe_id: probe_id.to_string(),
            created_at: Instant::now(),
            tx,
        };

        let mut pending = self.pending.lock().unwrap();
        if pending.insert(request_id.to_string(), record).is_some() {
            tracing::warn!(request_id, "replaced an already-tracked command");
        }

        PendingCommand {
            request_id: request_id.to_string(),
            probe_id: probe_id.to_string(),
            command: command.to_string(),
            level,
            rx,
        }
    }

    /// Deliver a probe result into the request's slot and drop the record.
    ///
    /// Returns false when the request is not tracked (already completed,
    /// canceled, or never registered). A result for an abandoned waiter is
    /// absorbed: the record is removed and the delivery becomes a no-op.
    pub fn complete(&self, request_id: &str, result: CommandResult) -> bool {
        let record = {
            let mut pending = self.pending.lock().unwrap();
            pending.remove(request_id)
        };

        match record {
            Some(record) => {
                if record.tx.try_send(result).is_err() {
                    tracing::debug!(
                        request_id,
                        probe_id = %record.probe_id,
                        "result arrived after the waiter left; absorbing"
                    );
                }
                true
            }
            None => false,
        }
    }

    /// Drop the record and close the slot; any waiter observes cancellation.
    pub fn cancel(&self, request_id: &str) {
        let mut pending = self.pending.lock().unwrap();
        pending.remove(request_id);
    }

    /// Number of currently tracked requests.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Cancel entries older than `ttl`. Returns how many were swept.
    pub fn sweep_stale(&self, ttl: Duration) -> usize {
        let stale: Vec<(String, String)> = {
            let pending = self.pending.lock().unwrap();
            pending
                .iter()
                .filter(|(_, record)| record.created_at.elapsed() > ttl)
                .map(|(id, record)| (id.clone(), record.probe_id.clone()))
                .collect()
        };

        for (request_id, probe_id) in &stale {
            tracing::warn!(request_id, probe_id, "canceling abandoned command");
            self.cancel(request_id);
        }
        stale.len()
    }

    /// Background sweeper that cancels abandoned entries until shutdown.
    pub async fn run_sweeper(&self, interval: Duration, ttl: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("command tracker sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let swept = self.sweep_stale(ttl);
                    if swept > 0 {
                        tracing::debug!(swept, "swept abandoned commands");
                    }
                }
            }
        }
    }

}
