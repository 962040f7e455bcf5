//! MCP tool surface: a stdio JSON-RPC server exposing the command and
//! approval pipeline as tools.

pub mod server;
pub mod tools;

pub use server::serve_stdio;
pub use tools::{call_tool, tool_definitions, ToolOutcome};
