//! Symbols command - document symbols of one file

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::App;
use crate::models::symbol::Symbol;

#[derive(Args, Debug)]
pub struct SymbolsArgs {
    /// File path relative to the workspace root
    pub path: PathBuf,

    /// Flatten nested symbols into one list (children carry a container)
    #[arg(long)]
    pub flat: bool,
}

#[derive(Serialize)]
struct SymbolsResponse {
    path: PathBuf,
    count: usize,
    symbols: Vec<Symbol>,
}

pub async fn execute(args: SymbolsArgs, app: &App) -> Result<()> {
    let ctx = app.output();
    let path = args.path.clone();

    let result = app
        .with_session(|session| async move { session.request_document_symbols(&path).await })
        .await;

    match result {
        Ok(symbols) => {
            let symbols = if args.flat {
                Symbol::flatten(&symbols)
            } else {
                symbols
            };
            ctx.print_success_flat(SymbolsResponse {
                path: args.path,
                count: symbols.len(),
                symbols,
            });
            Ok(())
        }
        Err(e) => ctx.report_session_error(e),
    }
}
