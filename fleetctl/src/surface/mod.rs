//! Surface-agnostic response rendering.
//!
//! Core results are projected into a [`ResponseEnvelope`] once, then written
//! to whichever transport asked, so HTTP and MCP cannot drift apart.

pub mod approvals;
pub mod commands;
pub mod envelope;
pub mod registry;

pub use approvals::{
    build_decide_envelope, render_decide, DecideApprovalProjection, DecideApprovalSuccess,
};
pub use commands::{build_command_envelope, render_command, CommandInvokeProjection};
pub use envelope::{write_for_surface, HttpErrorBody, ResponseEnvelope, Surface, WriterKernel};
pub use registry::{dispatch_for_surface, unsupported_surface, PolicyRegistry};
