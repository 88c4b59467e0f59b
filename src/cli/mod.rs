//! CLI module for lsp-bridge
//!
//! Provides command-line interface using clap derive macros.

pub mod commands;
pub mod output;

pub use output::OutputContext;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::models::symbol::Language;
use commands::{
    cat::CatArgs, definition::DefinitionArgs, serve::ServeArgs, servers::ServersArgs,
    symbols::SymbolsArgs,
};

const LONG_ABOUT: &str = r#"
lsp-bridge - drive a language server from the command line or over MCP

Starts one language server for one workspace, issues requests against it,
and shuts it down again. `serve` exposes the same operations as MCP tools
on stdin/stdout.

EXAMPLES:
  lsp-bridge -l python definition main.py 7 5
  lsp-bridge -l rust -r ~/src/app symbols src/lib.rs --flat
  lsp-bridge -l python cat main.py
  lsp-bridge -l typescript serve
  lsp-bridge servers --missing-only

Lines and columns are zero-indexed; columns count UTF-16 code units.
"#;

/// lsp-bridge - language server client and MCP tool bridge
#[derive(Parser, Debug)]
#[command(name = "lsp-bridge")]
#[command(author, version, about, long_about = LONG_ABOUT)]
#[command(propagate_version = true)]
#[command(after_help = "Use 'lsp-bridge <COMMAND> --help' for more information about a command.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Flags shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Language of the analyzed code (python, rust, typescript, ...)
    #[arg(short, long, global = true)]
    pub language: Option<Language>,

    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Config file (defaults to ~/.config/lsp-bridge/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Single-line JSON output
    #[arg(long, global = true)]
    pub compact: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Go to definition at a position
    Definition(DefinitionArgs),

    /// List the symbols defined in a file
    Symbols(SymbolsArgs),

    /// Print a file as the language server sees it
    Cat(CatArgs),

    /// Serve tools over MCP stdio
    Serve(ServeArgs),

    /// List supported languages and their language servers
    Servers(ServersArgs),
}
