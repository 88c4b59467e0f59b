//! Language Server Configurations
//!
//! Built-in analyzer commands per language with tiered timeout profiles.

use std::process::Command;

use crate::models::config::ServerOverride;
use crate::models::symbol::Language;

// ============================================================================
// Server Performance Tiers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerTier {
    /// Fast servers: rust-analyzer, gopls, solargraph
    Fast,
    /// Standard servers: csharp-ls, dart, jedi
    Standard,
    /// Slow servers: typescript-language-server, jdtls, kotlin-lsp
    Slow,
}

impl ServerTier {
    /// Factor applied to the configured startup and request budgets
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Fast => 1.0,
            Self::Standard => 1.5,
            Self::Slow => 2.0,
        }
    }
}

impl std::fmt::Display for ServerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Standard => write!(f, "standard"),
            Self::Slow => write!(f, "slow"),
        }
    }
}

// ============================================================================
// Platform Detection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOS
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct InstallInstructions {
    pub macos: &'static str,
    pub linux: &'static str,
    pub windows: &'static str,
}

impl InstallInstructions {
    const fn same(all: &'static str) -> Self {
        Self {
            macos: all,
            linux: all,
            windows: all,
        }
    }

    pub fn current(&self) -> &'static str {
        match Platform::current() {
            Platform::MacOS => self.macos,
            Platform::Linux => self.linux,
            Platform::Windows => self.windows,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: &'static str,
    pub command: &'static str,
    pub args: &'static [&'static str],
    pub install: InstallInstructions,
    pub version_arg: &'static str,
    pub tier: ServerTier,
}

impl ServerConfig {
    /// Built-in analyzer for a language
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Python => Self {
                name: "jedi-language-server",
                command: "jedi-language-server",
                args: &[],
                version_arg: "--version",
                install: InstallInstructions::same("pip install jedi-language-server"),
                tier: ServerTier::Standard,
            },
            Language::Rust => Self {
                name: "rust-analyzer",
                command: "rust-analyzer",
                args: &[],
                version_arg: "--version",
                install: InstallInstructions::same("rustup component add rust-analyzer"),
                tier: ServerTier::Fast,
            },
            Language::TypeScript | Language::JavaScript => Self {
                name: "typescript-language-server",
                command: "typescript-language-server",
                args: &["--stdio"],
                version_arg: "--version",
                install: InstallInstructions::same(
                    "npm install -g typescript typescript-language-server",
                ),
                tier: ServerTier::Slow,
            },
            Language::Go => Self {
                name: "gopls",
                command: "gopls",
                args: &[],
                version_arg: "version",
                install: InstallInstructions::same("go install golang.org/x/tools/gopls@latest"),
                tier: ServerTier::Fast,
            },
            Language::Java => Self {
                name: "jdtls",
                command: "jdtls",
                args: &[],
                version_arg: "--version",
                install: InstallInstructions {
                    macos: "brew install jdtls",
                    linux: "Download from https://download.eclipse.org/jdtls/snapshots/",
                    windows: "Download from https://download.eclipse.org/jdtls/snapshots/",
                },
                tier: ServerTier::Slow,
            },
            Language::CSharp => Self {
                name: "csharp-ls",
                command: "csharp-ls",
                args: &[],
                version_arg: "--version",
                install: InstallInstructions::same("dotnet tool install -g csharp-ls"),
                tier: ServerTier::Standard,
            },
            Language::Ruby => Self {
                name: "solargraph",
                command: "solargraph",
                args: &["stdio"],
                version_arg: "--version",
                install: InstallInstructions::same("gem install solargraph"),
                tier: ServerTier::Fast,
            },
            Language::Dart => Self {
                name: "dart",
                command: "dart",
                args: &["language-server"],
                version_arg: "--version",
                install: InstallInstructions {
                    macos: "brew install dart-sdk",
                    linux: "Download from https://dart.dev/get-dart",
                    windows: "choco install dart-sdk",
                },
                tier: ServerTier::Standard,
            },
            Language::Kotlin => Self {
                name: "kotlin-lsp",
                command: "kotlin-lsp",
                args: &["--stdio"],
                version_arg: "--help",
                install: InstallInstructions {
                    macos: "brew install JetBrains/utils/kotlin-lsp",
                    linux: "Download from https://github.com/JetBrains/kotlin-lsp/releases",
                    windows: "Download from https://github.com/JetBrains/kotlin-lsp/releases",
                },
                tier: ServerTier::Slow,
            },
        }
    }

    pub fn is_installed(&self) -> bool {
        #[cfg(unix)]
        if let Ok(output) = Command::new("which").arg(self.command).output()
            && output.status.success()
        {
            return true;
        }

        #[cfg(windows)]
        if let Ok(output) = Command::new("where").arg(self.command).output()
            && output.status.success()
        {
            return true;
        }

        Command::new(self.command)
            .arg(self.version_arg)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok()
    }

    /// Get installed version (if available)
    pub fn version(&self) -> Option<String> {
        let output = Command::new(self.command)
            .arg(self.version_arg)
            .output()
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = if stdout.trim().is_empty() {
            String::from_utf8_lossy(&output.stderr).to_string()
        } else {
            stdout.to_string()
        };

        text.lines()
            .find(|line| !line.trim().is_empty())
            .map(|s| s.trim().to_string())
    }
}

/// Concrete program and arguments used to launch a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn resolve(server: &ServerConfig, override_: Option<&ServerOverride>) -> Self {
        match override_ {
            Some(o) => Self {
                program: o.command.clone(),
                args: o.args.clone(),
            },
            None => Self {
                program: server.command.to_string(),
                args: server.args.iter().map(|a| a.to_string()).collect(),
            },
        }
    }
}

impl std::fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Server health check result
#[derive(Debug, Clone)]
pub struct ServerHealth {
    pub language: Language,
    pub name: &'static str,
    pub command: String,
    pub tier: ServerTier,
    pub installed: bool,
    pub version: Option<String>,
    pub install_instruction: &'static str,
}

/// Check health of all built-in servers
pub fn check_all_servers() -> Vec<ServerHealth> {
    Language::all()
        .iter()
        .map(|&language| {
            let config = ServerConfig::for_language(language);
            let installed = config.is_installed();
            let version = if installed { config.version() } else { None };
            ServerHealth {
                language,
                name: config.name,
                command: LaunchCommand::resolve(&config, None).to_string(),
                tier: config.tier,
                installed,
                version,
                install_instruction: config.install.current(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_language_has_a_server() {
        for &language in Language::all() {
            let config = ServerConfig::for_language(language);
            assert!(!config.command.is_empty());
            assert!(!config.install.current().is_empty());
        }
    }

    #[test]
    fn test_python_uses_jedi() {
        let config = ServerConfig::for_language(Language::Python);
        assert_eq!(config.command, "jedi-language-server");
        assert_eq!(config.tier, ServerTier::Standard);
    }

    #[test]
    fn test_launch_command_defaults_and_override() {
        let ts = ServerConfig::for_language(Language::TypeScript);
        let launch = LaunchCommand::resolve(&ts, None);
        assert_eq!(launch.to_string(), "typescript-language-server --stdio");

        let custom = ServerOverride {
            command: "pyright-langserver".to_string(),
            args: vec!["--stdio".to_string()],
        };
        let launch = LaunchCommand::resolve(&ts, Some(&custom));
        assert_eq!(launch.program, "pyright-langserver");
        assert_eq!(launch.args, vec!["--stdio"]);
    }

    #[test]
    fn test_tier_multipliers_are_ordered() {
        assert!(ServerTier::Fast.multiplier() < ServerTier::Standard.multiplier());
        assert!(ServerTier::Standard.multiplier() < ServerTier::Slow.multiplier());
        assert_eq!(ServerTier::Slow.to_string(), "slow");
    }

    #[test]
    fn test_platform_detection() {
        let platform = Platform::current();
        assert!(matches!(
            platform,
            Platform::MacOS | Platform::Linux | Platform::Windows
        ));
    }
}
