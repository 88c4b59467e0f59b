//! Session configuration
//!
//! Immutable settings threaded into a [`Session`](crate::infra::lsp::Session)
//! at construction. Nothing here reads ambient process state.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::infra::lsp::servers::{LaunchCommand, ServerConfig, ServerTier};
use crate::models::config::{ServerOverride, TimeoutSection};
use crate::models::symbol::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Request,
    Initialization,
    Shutdown,
}

impl OperationType {
    pub fn from_method(method: &str) -> Self {
        match method {
            "initialize" => Self::Initialization,
            "shutdown" => Self::Shutdown,
            _ => Self::Request,
        }
    }
}

/// Base time budgets before tier scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub startup: Duration,
    pub request: Duration,
    pub shutdown_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&TimeoutSection::default())
    }
}

impl From<&TimeoutSection> for Timeouts {
    fn from(section: &TimeoutSection) -> Self {
        Self {
            startup: Duration::from_secs(section.startup_secs),
            request: Duration::from_secs(section.request_secs),
            shutdown_grace: Duration::from_secs(section.shutdown_grace_secs),
        }
    }
}

impl Timeouts {
    pub fn timeout_for(&self, tier: ServerTier, method: &str) -> Duration {
        match OperationType::from_method(method) {
            OperationType::Initialization => self.startup.mul_f64(tier.multiplier()),
            OperationType::Shutdown => self.shutdown_grace,
            OperationType::Request => self.request.mul_f64(tier.multiplier()),
        }
    }
}

/// Language, workspace and launch settings for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub code_language: Language,
    pub workspace_root: PathBuf,
    pub timeouts: Timeouts,
    pub server: Option<ServerOverride>,
}

impl SessionConfig {
    pub fn new(code_language: Language, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            code_language,
            workspace_root: workspace_root.into(),
            timeouts: Timeouts::default(),
            server: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_server(mut self, server: Option<ServerOverride>) -> Self {
        self.server = server;
        self
    }

    /// Root must be an existing absolute directory
    pub fn validate(&self) -> Result<(), ConfigError> {
        let root = &self.workspace_root;
        if !root.is_absolute() {
            return Err(ConfigError::invalid(
                "workspace_root",
                format!("must be absolute: {}", root.display()),
            ));
        }
        if !root.exists() {
            return Err(ConfigError::invalid(
                "workspace_root",
                format!("does not exist: {}", root.display()),
            ));
        }
        if !root.is_dir() {
            return Err(ConfigError::invalid(
                "workspace_root",
                format!("not a directory: {}", root.display()),
            ));
        }
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::for_language(self.code_language)
    }

    pub fn launch_command(&self) -> LaunchCommand {
        LaunchCommand::resolve(&self.server_config(), self.server.as_ref())
    }

    pub fn timeout_for(&self, method: &str) -> Duration {
        self.timeouts.timeout_for(self.server_config().tier, method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_parsing() {
        assert_eq!(
            OperationType::from_method("textDocument/definition"),
            OperationType::Request
        );
        assert_eq!(
            OperationType::from_method("initialize"),
            OperationType::Initialization
        );
        assert_eq!(
            OperationType::from_method("shutdown"),
            OperationType::Shutdown
        );
    }

    #[test]
    fn test_timeout_calculation() {
        let timeouts = Timeouts::default();

        // Fast tier request: 30s * 1.0
        assert_eq!(
            timeouts.timeout_for(ServerTier::Fast, "textDocument/definition"),
            Duration::from_secs(30)
        );
        // Slow tier startup: 60s * 2.0
        assert_eq!(
            timeouts.timeout_for(ServerTier::Slow, "initialize"),
            Duration::from_secs(120)
        );
        // Grace period is never scaled
        assert_eq!(
            timeouts.timeout_for(ServerTier::Slow, "shutdown"),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_validate_rejects_relative_root() {
        let config = SessionConfig::new(Language::Python, "proj");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_missing_and_file_roots() {
        let dir = tempfile::tempdir().unwrap();
        let missing = SessionConfig::new(Language::Python, dir.path().join("missing"));
        assert!(missing.validate().is_err());

        let file = dir.path().join("main.py");
        std::fs::write(&file, "").unwrap();
        assert!(SessionConfig::new(Language::Python, file).validate().is_err());

        assert!(SessionConfig::new(Language::Python, dir.path()).validate().is_ok());
    }

    #[test]
    fn test_launch_command_uses_override() {
        let config = SessionConfig::new(Language::Python, "/proj").with_server(Some(
            ServerOverride {
                command: "pylsp".to_string(),
                args: Vec::new(),
            },
        ));
        assert_eq!(config.launch_command().program, "pylsp");
        assert_eq!(
            SessionConfig::new(Language::Python, "/proj")
                .launch_command()
                .program,
            "jedi-language-server"
        );
    }
}
