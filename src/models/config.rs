//! Configuration file model for lsp-bridge
//!
//! Every section is optional; command-line flags override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::symbol::Language;
use crate::error::ConfigError;

/// Contents of `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub timeouts: TimeoutSection,

    /// Replaces the built-in analyzer command when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerOverride>,

    #[serde(default)]
    pub bridge: BridgeSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionSection {
    pub code_language: Option<Language>,
    pub workspace_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSection {
    #[serde(default = "defaults::startup_secs")]
    pub startup_secs: u64,

    #[serde(default = "defaults::request_secs")]
    pub request_secs: u64,

    #[serde(default = "defaults::shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            startup_secs: defaults::startup_secs(),
            request_secs: defaults::request_secs(),
            shutdown_grace_secs: defaults::shutdown_grace_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerOverride {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BridgeSection {
    /// Allowlist of tool names; all tools when absent
    pub tools: Option<Vec<String>>,
}

pub(crate) mod defaults {
    pub fn startup_secs() -> u64 {
        60
    }
    pub fn request_secs() -> u64 {
        30
    }
    pub fn shutdown_grace_secs() -> u64 {
        5
    }
}

impl FileConfig {
    /// XDG standard: ~/.config/lsp-bridge/config.toml
    pub fn default_path() -> PathBuf {
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lsp-bridge")
            .join("config.toml")
    }

    /// Load an explicit file, or the default location when none is given.
    ///
    /// A missing explicit file is an error; a missing default file yields
    /// the defaults.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::invalid(
                        "config",
                        format!("Config file does not exist: {}", path.display()),
                    ));
                }
                Self::load_from_path(path).await
            }
            None => {
                let path = Self::default_path();
                if !path.exists() {
                    return Ok(Self::default());
                }
                Self::load_from_path(&path).await
            }
        }
    }

    async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeouts.startup_secs == 0 {
            return Err(ConfigError::invalid("timeouts.startup_secs", "must be positive"));
        }
        if self.timeouts.request_secs == 0 {
            return Err(ConfigError::invalid("timeouts.request_secs", "must be positive"));
        }
        if let Some(server) = &self.server
            && server.command.trim().is_empty()
        {
            return Err(ConfigError::invalid("server.command", "must not be empty"));
        }
        Ok(())
    }
}
