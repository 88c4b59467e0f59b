//! Servers command - which language servers are installed

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::OutputContext;
use crate::infra::lsp::{ServerHealth, check_all_servers};

#[derive(Args, Debug)]
pub struct ServersArgs {
    /// Only list servers that are not installed
    #[arg(long)]
    pub missing_only: bool,
}

#[derive(Serialize)]
struct ServersResponse {
    summary: ServersSummary,
    servers: Vec<ServerEntry>,
}

#[derive(Serialize)]
struct ServersSummary {
    installed: usize,
    missing: usize,
}

#[derive(Serialize)]
struct ServerEntry {
    language: String,
    name: String,
    command: String,
    tier: String,
    installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    install_command: Option<String>,
}

impl From<ServerHealth> for ServerEntry {
    fn from(health: ServerHealth) -> Self {
        Self {
            language: health.language.to_string(),
            name: health.name.to_string(),
            command: health.command,
            tier: health.tier.to_string(),
            installed: health.installed,
            version: health.version,
            install_command: (!health.installed).then(|| health.install_instruction.to_string()),
        }
    }
}

fn build_response(health: Vec<ServerHealth>, missing_only: bool) -> ServersResponse {
    let servers: Vec<ServerEntry> = health
        .into_iter()
        .filter(|h| !missing_only || !h.installed)
        .map(ServerEntry::from)
        .collect();

    let installed = servers.iter().filter(|s| s.installed).count();
    ServersResponse {
        summary: ServersSummary {
            installed,
            missing: servers.len() - installed,
        },
        servers,
    }
}

/// Runs without a session; a missing server is reported, not an error
pub fn execute(args: ServersArgs, ctx: &OutputContext) -> Result<()> {
    ctx.print_success_flat(build_response(check_all_servers(), args.missing_only));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::lsp::ServerTier;
    use crate::models::symbol::Language;

    fn health(language: Language, installed: bool) -> ServerHealth {
        ServerHealth {
            language,
            name: "test-ls",
            command: "test-ls --stdio".to_string(),
            tier: ServerTier::Fast,
            installed,
            version: installed.then(|| "1.0.0".to_string()),
            install_instruction: "pip install test-ls",
        }
    }

    #[test]
    fn test_missing_only_filter() {
        let all = vec![health(Language::Python, true), health(Language::Go, false)];
        let response = build_response(all, true);

        assert_eq!(response.servers.len(), 1);
        assert_eq!(response.servers[0].language, "go");
        assert_eq!(response.summary.missing, 1);
        assert_eq!(response.summary.installed, 0);
    }

    #[test]
    fn test_install_command_only_when_missing() {
        let installed = ServerEntry::from(health(Language::Rust, true));
        assert!(installed.install_command.is_none());
        assert_eq!(installed.version.as_deref(), Some("1.0.0"));

        let missing = ServerEntry::from(health(Language::Rust, false));
        assert_eq!(missing.install_command.as_deref(), Some("pip install test-ls"));
        assert_eq!(missing.tier, "fast");
    }
}
