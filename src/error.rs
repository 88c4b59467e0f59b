//! Error types for lsp-bridge

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type SessionResult<T> = std::result::Result<T, SessionError>;
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Failures surfaced by a language server session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to launch language server: {0}")]
    BackendLaunch(String),

    #[error("Language server handshake failed: {0}")]
    Handshake(String),

    #[error("'{method}' timed out after {}ms", .timeout.as_millis())]
    RequestTimeout { method: String, timeout: Duration },

    #[error("Server error [{code}]: {message}")]
    Backend { code: i32, message: String },

    #[error("Invalid position {line}:{column} in {}: {reason}", .path.display())]
    InvalidPosition {
        path: PathBuf,
        line: u32,
        column: u32,
        reason: String,
    },

    #[error("File not found in workspace: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Path escapes the workspace root: {}", .0.display())]
    PathEscapesWorkspace(PathBuf),

    #[error("File is not open: {}", .0.display())]
    NotOpen(PathBuf),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    /// Stable identifier for structured error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BackendLaunch(_) => "backend_launch_error",
            Self::Handshake(_) => "handshake_error",
            Self::RequestTimeout { .. } => "request_timeout",
            Self::Backend { .. } => "backend_error",
            Self::InvalidPosition { .. } => "invalid_position",
            Self::FileNotFound(_) => "file_not_found",
            Self::PathEscapesWorkspace(_) => "path_escapes_workspace",
            Self::NotOpen(_) => "not_open",
            Self::SessionClosed => "session_closed",
            Self::Protocol(_) | Self::Json(_) => "protocol_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
        }
    }

    pub fn error_code(&self) -> i32 {
        match self {
            Self::Backend { code, .. } => *code,
            Self::SessionClosed => -32099,
            Self::RequestTimeout { .. } => -32001,
            Self::InvalidPosition { .. } => -32602,
            _ => -32000,
        }
    }

    /// The session never became usable
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::BackendLaunch(_) | Self::Handshake(_) | Self::Config(_)
        )
    }
}

impl From<crate::infra::lsp::protocol::ResponseError> for SessionError {
    fn from(err: crate::infra::lsp::protocol::ResponseError) -> Self {
        SessionError::Backend {
            code: err.code,
            message: err.message,
        }
    }
}

/// Failures surfaced by the tool bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Tool already registered: {0}")]
    DuplicateToolName(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl BridgeError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateToolName(_) => "duplicate_tool_name",
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::Session(e) => e.kind(),
        }
    }

    pub fn invalid_arguments(tool: &str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unsupported language: {0}. Run 'lsp-bridge servers' to see supported languages.")]
    UnsupportedLanguage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_kinds() {
        assert_eq!(SessionError::SessionClosed.kind(), "session_closed");
        assert_eq!(
            SessionError::NotOpen(PathBuf::from("main.py")).kind(),
            "not_open"
        );
        assert_eq!(
            SessionError::RequestTimeout {
                method: "textDocument/definition".to_string(),
                timeout: Duration::from_secs(1),
            }
            .kind(),
            "request_timeout"
        );
    }

    #[test]
    fn test_backend_error_keeps_code() {
        let err = SessionError::Backend {
            code: -32601,
            message: "Method not found".to_string(),
        };
        assert_eq!(err.error_code(), -32601);
        assert_eq!(err.to_string(), "Server error [-32601]: Method not found");
    }

    #[test]
    fn test_timeout_message() {
        let err = SessionError::RequestTimeout {
            method: "initialize".to_string(),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "'initialize' timed out after 1500ms");
    }

    #[test]
    fn test_bridge_error_wraps_session_kind() {
        let err = BridgeError::from(SessionError::SessionClosed);
        assert_eq!(err.kind(), "session_closed");
        assert!(matches!(err, BridgeError::Session(SessionError::SessionClosed)));

        let err = BridgeError::invalid_arguments("request_definition", "missing 'path'");
        assert_eq!(err.kind(), "invalid_arguments");
        assert_eq!(
            err.to_string(),
            "Invalid arguments for 'request_definition': missing 'path'"
        );
    }
}
