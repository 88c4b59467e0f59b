//! Cat command - a file's text exactly as sent to the language server

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::App;

#[derive(Args, Debug)]
pub struct CatArgs {
    /// File path relative to the workspace root
    pub path: PathBuf,
}

#[derive(Serialize)]
struct CatResponse {
    path: PathBuf,
    text: String,
}

pub async fn execute(args: CatArgs, app: &App) -> Result<()> {
    let ctx = app.output();
    let path = args.path.clone();

    let result = app
        .with_session(|session| async move {
            let handle = session.open_file(&path).await?;
            let text = handle.text();
            handle.close().await?;
            text
        })
        .await;

    match result {
        Ok(text) => {
            ctx.print_success_flat(CatResponse {
                path: args.path,
                text,
            });
            Ok(())
        }
        Err(e) => ctx.report_session_error(e),
    }
}
