//! lsp-bridge - language server sessions as command-line and MCP tools
//!
//! A [`Session`] owns one language server for one workspace: it launches
//! the server, performs the handshake, tracks open documents and cached
//! diagnostics, and tears everything down when the scope ends. A
//! [`ToolBridge`] publishes a session's operations as MCP tools over stdio.

pub mod app;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod infra;
pub mod models;

pub use bridge::ToolBridge;
pub use config::SessionConfig;
pub use error::{BridgeError, BridgeResult, ConfigError, SessionError, SessionResult};
pub use infra::lsp::Session;
