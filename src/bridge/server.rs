//! Tool Bridge serve loop
//!
//! One invocation at a time: each `tools/call` runs to completion (or is
//! abandoned when the session stops) before the next line is taken.

use std::io;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::protocol::{McpMessage, McpResponse, RpcError, ToolCallParams, ToolResult, initialize_result};
use super::registry::ToolRegistry;
use super::tools::session_registry;
use crate::error::{BridgeError, BridgeResult, SessionError};
use crate::infra::lsp::Session;
use crate::infra::lsp::protocol::error_codes;

const LINE_BUFFER: usize = 32;

pub struct ToolBridge {
    session: Session,
    registry: ToolRegistry,
}

impl ToolBridge {
    pub fn new(session: Session, registry: ToolRegistry) -> Self {
        Self { session, registry }
    }

    /// Bridge over the standard session tools
    pub fn for_session(session: Session, allowlist: Option<&[String]>) -> BridgeResult<Self> {
        let registry = session_registry(&session, allowlist)?;
        Ok(Self::new(session, registry))
    }

    /// Serve until the transport reaches EOF or the session stops.
    ///
    /// EOF means no further requests: everything received before it is
    /// still answered.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let (lines_tx, mut lines_rx) = mpsc::channel::<Vec<u8>>(LINE_BUFFER);

        let reader_task = tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            loop {
                let mut line = Vec::new();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        if lines_tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Tool transport read error: {}", e);
                        break;
                    }
                }
            }
        });

        tracing::info!("Tool bridge serving {} tools", self.registry.len());

        loop {
            let bytes = tokio::select! {
                biased;
                line = lines_rx.recv() => match line {
                    Some(bytes) => bytes,
                    None => {
                        tracing::debug!("Tool transport closed");
                        break;
                    }
                },
                _ = self.session.closed() => {
                    tracing::info!("Session stopped, ending tool bridge");
                    break;
                }
            };

            let response = match String::from_utf8(bytes) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(&line).await,
                Err(e) => Some(McpResponse::error(Value::Null, RpcError::parse_error(e))),
            };
            if let Some(response) = response {
                write_line(&mut writer, &response).await?;
            }
        }

        reader_task.abort();
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<McpResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                return Some(McpResponse::error(Value::Null, RpcError::parse_error(e)));
            }
        };
        let id_hint = value.get("id").cloned().unwrap_or(Value::Null);
        let message: McpMessage = match serde_json::from_value(value) {
            Ok(message) => message,
            Err(e) => return Some(McpResponse::error(id_hint, RpcError::invalid_request(e))),
        };

        let Some(id) = message.id else {
            handle_notification(&message.method);
            return None;
        };

        let result = match message.method.as_str() {
            "initialize" => Ok(initialize_result()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.list_tools() })),
            "tools/call" => self.call_tool(message.params).await,
            other => Err(RpcError::method_not_found(other)),
        };

        Some(match result {
            Ok(value) => McpResponse::success(id, value),
            Err(error) => McpResponse::error(id, error),
        })
    }

    async fn call_tool(&self, params: Value) -> Result<Value, RpcError> {
        let params: ToolCallParams = serde_json::from_value(params)
            .map_err(|e| RpcError::invalid_params(format!("Invalid tools/call params: {}", e)))?;

        let outcome = tokio::select! {
            biased;
            result = self.registry.invoke(&params.name, params.arguments) => result,
            _ = self.session.closed() => Err(SessionError::SessionClosed.into()),
        };

        let result = match outcome {
            Ok(value) => ToolResult::success(value),
            Err(e @ (BridgeError::UnknownTool(_) | BridgeError::InvalidArguments { .. })) => {
                return Err(RpcError::from_bridge(&e));
            }
            Err(e) => {
                tracing::debug!("Tool {} failed: {}", params.name, e);
                ToolResult::failure(&e)
            }
        };
        serde_json::to_value(result).map_err(|e| RpcError::invalid_params(e.to_string()))
    }
}

fn handle_notification(method: &str) {
    match method {
        "notifications/initialized" => tracing::info!("Tool client initialized"),
        other => tracing::debug!("Ignoring notification: {}", other),
    }
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(message).unwrap_or_else(|e| {
        json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {
                "code": error_codes::INTERNAL_ERROR,
                "message": format!("Serialization error: {}", e),
            },
        })
        .to_string()
    });
    tracing::trace!("MCP -> {}", json);
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
