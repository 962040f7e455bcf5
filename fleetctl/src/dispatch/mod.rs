//! Command dispatch: payloads, per-request tracking, and the policy-driven
//! dispatcher that ties them to the outbound sender.

pub mod models;
pub mod sender;
pub mod service;
pub mod tracker;

pub use models::{
    result_text, CommandPayload, CommandResult, CommandResultEnvelope, DispatchError,
    DispatchState, DEFAULT_DISPATCH_TIMEOUT,
};
pub use sender::{CommandSender, MessageType, SendError};
pub use service::{DispatchPolicy, DispatchService};
pub use tracker::{CommandTracker, PendingCommand};
