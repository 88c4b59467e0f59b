//! Definition command - go to definition at a position

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::App;
use crate::models::symbol::Location;

#[derive(Args, Debug)]
pub struct DefinitionArgs {
    /// File path relative to the workspace root
    pub path: PathBuf,

    /// Zero-indexed line
    pub line: u32,

    /// Zero-indexed UTF-16 column
    pub column: u32,
}

#[derive(Serialize)]
struct DefinitionResponse {
    count: usize,
    locations: Vec<Location>,
}

pub async fn execute(args: DefinitionArgs, app: &App) -> Result<()> {
    let ctx = app.output();
    let DefinitionArgs { path, line, column } = args;

    let result = app
        .with_session(|session| async move {
            session.request_definition(&path, line, column).await
        })
        .await;

    match result {
        Ok(locations) => {
            ctx.print_success_flat(DefinitionResponse {
                count: locations.len(),
                locations,
            });
            Ok(())
        }
        Err(e) => ctx.report_session_error(e),
    }
}
