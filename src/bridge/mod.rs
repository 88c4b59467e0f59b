//! Tool Bridge
//!
//! Exposes session operations as named tools over MCP stdio.

pub mod paginate;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod tools;

pub use registry::{ParamSpec, ParamType, ToolArgs, ToolDescriptor, ToolHandler, ToolRegistry, ToolSpec};
pub use server::ToolBridge;
pub use tools::{TOOL_NAMES, session_registry, validate_allowlist};
