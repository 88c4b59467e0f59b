//! LSP infrastructure
//!
//! Single-backend session over JSON-RPC 2.0:
//! - Protocol types and Content-Length framing
//! - Session lifecycle with id-correlated requests
//! - Reference-counted open documents
//! - Per-language server launch table

pub(crate) mod convert;
pub mod documents;
#[cfg(test)]
pub(crate) mod fake;
pub mod progress;
pub mod protocol;
pub mod servers;
pub mod session;
pub mod transport;
pub mod workspace;

pub use documents::OpenFileHandle;
pub use servers::{LaunchCommand, ServerConfig, ServerHealth, ServerTier, check_all_servers};
pub use session::{Session, SessionInfo, SessionState};
pub use workspace::Workspace;
