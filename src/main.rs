//! lsp-bridge - language server client and MCP tool bridge
//!
//! Results are printed as JSON on stdout; logs go to stderr so they never
//! interleave with the MCP stream.

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lsp_bridge::app::App;
use lsp_bridge::cli::{Cli, Commands, OutputContext};

/// How long blocked stdio reads may hold up process exit
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(500);

fn main() {
    let cli = Cli::parse();

    // Quiet by default; RUST_LOG overrides, -v enables debug
    let default_filter = if cli.global.verbose {
        "lsp_bridge=debug"
    } else {
        "lsp_bridge=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!(
                r#"{{"success":false,"error":"Failed to create runtime: {}"}}"#,
                e
            );
            std::process::exit(1);
        }
    };
    let result = runtime.block_on(run(cli));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);

    if let Err(e) = result {
        let kind = e
            .downcast_ref::<lsp_bridge::SessionError>()
            .map(|err| err.kind())
            .or_else(|| {
                e.downcast_ref::<lsp_bridge::ConfigError>()
                    .map(|_| "config_error")
            })
            .unwrap_or("error");
        let response = serde_json::json!({
            "success": false,
            "error": e.to_string(),
            "kind": kind,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&response)
                .unwrap_or_else(|_| format!(r#"{{"success":false,"error":"{}"}}"#, e))
        );
        std::process::exit(2);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    use lsp_bridge::cli::commands;

    let Cli { command, global } = cli;
    match command {
        // Server discovery needs no session or language
        Commands::Servers(args) => {
            commands::servers::execute(args, &OutputContext::new(!global.compact))
        }
        Commands::Definition(args) => {
            commands::definition::execute(args, &App::load(&global).await?).await
        }
        Commands::Symbols(args) => commands::symbols::execute(args, &App::load(&global).await?).await,
        Commands::Cat(args) => commands::cat::execute(args, &App::load(&global).await?).await,
        Commands::Serve(args) => commands::serve::execute(args, &App::load(&global).await?).await,
    }
}
