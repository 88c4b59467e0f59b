//! Serve command - expose the session as MCP tools on stdin/stdout

use anyhow::Result;
use clap::Args;

use crate::app::App;
use crate::bridge::ToolBridge;

#[derive(Args, Debug)]
pub struct ServeArgs {}

pub async fn execute(_args: ServeArgs, app: &App) -> Result<()> {
    let tools = app.tools().map(<[String]>::to_vec);

    app.with_session(|session| async move {
        tracing::info!(
            "Serving {} tools for {}",
            session.language(),
            session.workspace_root().display()
        );
        let bridge = ToolBridge::for_session(session, tools.as_deref())?;
        bridge
            .serve(tokio::io::stdin(), tokio::io::stdout())
            .await?;
        Ok::<_, anyhow::Error>(())
    })
    .await
}
