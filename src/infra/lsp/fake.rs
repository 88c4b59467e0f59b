//! Scripted in-process language server used by tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::DuplexStream;

use super::protocol::{Message, Response};
use super::session::Session;
use super::transport::{MessageReader, write_message};
use crate::config::SessionConfig;
use crate::models::symbol::Language;

pub(crate) const MAIN_PY: &str = "import os\n\ndef greet(name):\n    return f\"Hello, {name}!\"\n\n\ndef main():\n    greet(\"world\")\n";

pub(crate) enum Reply {
    Result(Value),
    Error(i32, String),
    /// Never answer
    Silent,
    /// Close the connection instead of answering
    Hangup,
}

type Handler = Box<dyn Fn(&Value) -> Reply + Send + Sync>;
type OpenHook = Box<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

/// Every message the fake received, in order
#[derive(Clone, Default)]
pub(crate) struct FakeLog {
    entries: Arc<Mutex<Vec<(String, Value)>>>,
}

impl FakeLog {
    fn record(&self, method: &str, params: Value) {
        self.entries.lock().unwrap().push((method.to_string(), params));
    }

    pub fn methods(&self) -> Vec<String> {
        self.entries.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.entries.lock().unwrap().iter().filter(|(m, _)| m == method).count()
    }

    pub fn params(&self, method: &str) -> Vec<Value> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Poll until `method` has been seen `count` times
    pub async fn wait_for(&self, method: &str, count: usize) {
        for _ in 0..200 {
            if self.count(method) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {} x{}; saw {:?}", method, count, self.methods());
    }
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    handlers: HashMap<String, Handler>,
    after_initialized: Vec<Value>,
    on_open: Option<OpenHook>,
    reorder: bool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> Reply + Send + Sync + 'static,
    {
        self.handlers.insert(method.to_string(), Box::new(handler));
        self
    }

    /// Raw messages pushed to the client after `initialized`
    pub fn after_initialized(mut self, messages: Vec<Value>) -> Self {
        self.after_initialized = messages;
        self
    }

    /// Messages pushed after each `didOpen`
    pub fn on_open<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        self.on_open = Some(Box::new(hook));
        self
    }

    /// Hold each document request's answer until the next one arrives,
    /// then answer both newest first
    pub fn reorder_responses(mut self) -> Self {
        self.reorder = true;
        self
    }

    /// Returns the client's (read, write) ends
    pub fn spawn(self) -> (DuplexStream, DuplexStream, FakeLog) {
        let (client_read, server_write) = tokio::io::duplex(64 * 1024);
        let (server_read, client_write) = tokio::io::duplex(64 * 1024);
        let log = FakeLog::default();
        tokio::spawn(self.run(server_read, server_write, log.clone()));
        (client_read, client_write, log)
    }

    fn reply_to(&self, method: &str, params: &Value) -> Reply {
        if let Some(handler) = self.handlers.get(method) {
            return handler(params);
        }
        match method {
            "initialize" => Reply::Result(json!({
                "capabilities": {
                    "definitionProvider": true,
                    "documentSymbolProvider": true,
                    "textDocumentSync": 1
                },
                "serverInfo": {"name": "fake-ls", "version": "0.0.1"}
            })),
            _ => Reply::Result(Value::Null),
        }
    }

    async fn run(self, read: DuplexStream, mut write: DuplexStream, log: FakeLog) {
        let mut reader = MessageReader::new(read);
        let mut held: Option<Response> = None;

        while let Ok(message) = reader.read_message().await {
            match message {
                Message::Request(request) => {
                    let params = request.params.clone().unwrap_or(Value::Null);
                    log.record(&request.method, params.clone());
                    let response = match self.reply_to(&request.method, &params) {
                        Reply::Result(value) => Response::success(request.id, value),
                        Reply::Error(code, message) => Response::error(request.id, code, message),
                        Reply::Silent => continue,
                        Reply::Hangup => break,
                    };

                    if self.reorder && held.is_none() && request.method.starts_with("textDocument/")
                    {
                        held = Some(response);
                        continue;
                    }
                    if write_message(&mut write, &response).await.is_err() {
                        break;
                    }
                    if let Some(previous) = held.take()
                        && write_message(&mut write, &previous).await.is_err()
                    {
                        break;
                    }
                }
                Message::Notification(notification) => {
                    let params = notification.params.unwrap_or(Value::Null);
                    log.record(&notification.method, params.clone());
                    let outgoing = match notification.method.as_str() {
                        "exit" => break,
                        "initialized" => self.after_initialized.clone(),
                        "textDocument/didOpen" => {
                            self.on_open.as_ref().map(|hook| hook(&params)).unwrap_or_default()
                        }
                        _ => Vec::new(),
                    };
                    for message in outgoing {
                        if write_message(&mut write, &message).await.is_err() {
                            return;
                        }
                    }
                }
                Message::Response(response) => {
                    log.record("response", serde_json::to_value(&response).unwrap());
                }
            }
        }
    }
}

/// Temporary Python workspace containing `main.py`
pub(crate) fn python_workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.py"), MAIN_PY).unwrap();
    dir
}

pub(crate) async fn start_fake(root: &Path, backend: FakeBackend) -> (Session, FakeLog) {
    let (reader, writer, log) = backend.spawn();
    let config = SessionConfig::new(Language::Python, root);
    let session = Session::start_with_streams(config, reader, writer)
        .await
        .unwrap();
    (session, log)
}
