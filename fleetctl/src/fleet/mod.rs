//! The probe fleet: registry, connection channels, and policy templates.

pub mod store;
pub mod templates;

pub use store::{ChannelSender, FleetError, FleetStore, OutboundMessage, ProbeState};
pub use templates::{PolicyTemplate, PolicyTemplateStore};
