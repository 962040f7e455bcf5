//! Request/response data structures for the HTTP API.

pub mod approvals;
pub mod commands;
pub mod probes;
