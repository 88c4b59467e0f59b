//! Application container for lsp-bridge
//!
//! Resolves CLI flags and the config file into one validated
//! [`SessionConfig`]; every command runs inside [`App::with_session`].

use std::future::Future;
use std::path::{Path, PathBuf};

use crate::bridge::validate_allowlist;
use crate::cli::{GlobalArgs, OutputContext};
use crate::config::{SessionConfig, Timeouts};
use crate::error::{ConfigError, SessionError};
use crate::infra::lsp::Session;
use crate::models::config::FileConfig;

#[derive(Debug)]
pub struct App {
    pub(crate) output: OutputContext,
    session: SessionConfig,
    tools: Option<Vec<String>>,
}

impl App {
    /// Load the config file and resolve it against the CLI flags
    pub async fn load(flags: &GlobalArgs) -> anyhow::Result<Self> {
        let file = FileConfig::load(flags.config.as_deref()).await?;
        let cwd = std::env::current_dir()?;
        Ok(Self::from_sources(flags, file, &cwd)?)
    }

    /// CLI flags win over file values; the root defaults to `cwd`
    pub fn from_sources(flags: &GlobalArgs, file: FileConfig, cwd: &Path) -> Result<Self, ConfigError> {
        let language = flags
            .language
            .or(file.session.code_language)
            .ok_or_else(|| {
                ConfigError::invalid(
                    "code_language",
                    "no language given; pass --language or set session.code_language",
                )
            })?;

        let root = flags
            .root
            .clone()
            .or(file.session.workspace_root)
            .map(|root| absolutize(&root, cwd))
            .unwrap_or_else(|| cwd.to_path_buf());

        if let Some(tools) = &file.bridge.tools {
            validate_allowlist(tools)?;
        }

        let session = SessionConfig::new(language, root)
            .with_timeouts(Timeouts::from(&file.timeouts))
            .with_server(file.server);
        session.validate()?;

        tracing::debug!(
            "Resolved {} session at {}",
            session.code_language,
            session.workspace_root.display()
        );

        Ok(Self {
            output: OutputContext::new(!flags.compact),
            session,
            tools: file.bridge.tools,
        })
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    /// Bridge tool allowlist, `None` for every tool
    pub fn tools(&self) -> Option<&[String]> {
        self.tools.as_deref()
    }

    pub fn output(&self) -> &OutputContext {
        &self.output
    }

    /// Start a session, run `body`, and always stop the session afterwards
    pub async fn with_session<F, Fut, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SessionError>,
    {
        Session::scoped(self.session.clone(), body).await
    }
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
