//! The capacity-signal provider contract.

use async_trait::async_trait;
use std::sync::RwLock;
use thiserror::Error;

use super::models::CapacitySignals;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("capacity signal query failed: {0}")]
    Query(String),

    #[error("capacity snapshot malformed: {0}")]
    Malformed(String),
}

/// Read-only adapter over an external observability source.
///
/// `Ok(None)` means the source is reachable but has no snapshot to offer;
/// callers treat it the same as an error: policy falls back to risk-only.
/// Implementations must be safe for concurrent callers.
#[async_trait]
pub trait CapacitySignalProvider: Send + Sync {
    async fn capacity_signals(&self) -> Result<Option<CapacitySignals>, SignalError>;
}

/// Provider backed by a fixed snapshot. Used when no observability source is
/// configured, and by tests that need deterministic signals.
#[derive(Default)]
pub struct StaticSignalProvider {
    signals: RwLock<Option<CapacitySignals>>,
}

impl StaticSignalProvider {
    /// A provider that always reports "unavailable".
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_signals(signals: CapacitySignals) -> Self {
        Self {
            signals: RwLock::new(Some(signals)),
        }
    }

    pub fn set(&self, signals: Option<CapacitySignals>) {
        *self.signals.write().unwrap() = signals;
    }
}

#[async_trait]
impl CapacitySignalProvider for StaticSignalProvider {
    async fn capacity_signals(&self) -> Result<Option<CapacitySignals>, SignalError> {
        Ok(self.signals.read().unwrap().clone())
    }
}
