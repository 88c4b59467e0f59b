//! LSP Session Manager
//!
//! Owns one backend process for one workspace root and one language:
//! - spawn, handshake, and graceful-then-forced teardown
//! - request/response correlation by id with per-request timeouts
//! - reference-counted open-file state
//! - diagnostics, log and progress notifications from the backend

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex as StdMutex, MutexGuard, PoisonError, RwLock as StdRwLock, RwLockReadGuard,
    RwLockWriteGuard, Weak,
};

use futures::FutureExt;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::convert;
use super::documents::{DocumentEntry, DocumentTable, OpenFileHandle};
use super::progress::ProgressUpdate;
use super::protocol::{
    ClientInfo, InitializeParams, InitializeResult, LogMessageParams, Message, MessageType,
    Notification, Request, RequestId, Response, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentPositionParams, WorkspaceFolder, client_capabilities, error_codes,
};
use super::servers::LaunchCommand;
use super::transport::{MessageReader, write_message};
use super::workspace::Workspace;
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::models::diagnostic::Diagnostic;
use crate::models::lsp::{Position, line_count, nth_line, path_to_uri, uri_to_path, utf16_len};
use crate::models::symbol::{Language, Location, Symbol};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type PendingRequest = oneshot::Sender<Response>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Running,
    /// Terminal
    Stopped,
}

/// Snapshot of a session for introspection
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub language: Language,
    pub server_command: String,
    pub workspace_root: PathBuf,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    pub capabilities: Value,
    pub open_files: usize,
}

struct SessionInner {
    config: SessionConfig,
    workspace: Workspace,
    launch: LaunchCommand,
    state: watch::Sender<SessionState>,
    writer: Mutex<Option<BoxedWriter>>,
    process: Mutex<Option<Child>>,
    next_id: AtomicU64,
    pending: StdMutex<HashMap<RequestId, PendingRequest>>,
    documents: StdMutex<DocumentTable>,
    diagnostics: StdRwLock<HashMap<PathBuf, Vec<Diagnostic>>>,
    server: StdRwLock<Option<InitializeResult>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    torn_down: AtomicBool,
}

/// Handle to a language server session.
///
/// Cloning is cheap; all clones share the same backend.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session in the `NotStarted` state
    pub fn new(config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;
        let workspace = Workspace::new(&config.workspace_root)?;
        let launch = config.launch_command();
        let (state, _) = watch::channel(SessionState::NotStarted);

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                workspace,
                launch,
                state,
                writer: Mutex::new(None),
                process: Mutex::new(None),
                next_id: AtomicU64::new(1),
                pending: StdMutex::new(HashMap::new()),
                documents: StdMutex::new(DocumentTable::default()),
                diagnostics: StdRwLock::new(HashMap::new()),
                server: StdRwLock::new(None),
                tasks: StdMutex::new(Vec::new()),
                torn_down: AtomicBool::new(false),
            }),
        })
    }

    /// Start a session, run `body`, then stop it exactly once.
    ///
    /// Teardown also runs when `body` fails or panics.
    pub async fn scoped<F, Fut, T, E>(config: SessionConfig, body: F) -> Result<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SessionError>,
    {
        let session = Self::new(config)?;
        session.start().await?;
        session.run_scoped(body).await
    }

    /// Run `body` against an already started session, then stop it
    pub async fn run_scoped<F, Fut, T, E>(self, body: F) -> Result<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let session = self.clone();
        let outcome = AssertUnwindSafe(async move { body(session).await })
            .catch_unwind()
            .await;
        self.stop().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Launch the backend process and complete the handshake
    pub async fn start(&self) -> SessionResult<()> {
        match self.state() {
            SessionState::Running => return Ok(()),
            SessionState::Stopped => return Err(SessionError::SessionClosed),
            SessionState::NotStarted => {}
        }

        let launch = &self.inner.launch;
        tracing::info!("Starting {} language server: {}", self.language(), launch);

        let mut child = Command::new(&launch.program)
            .args(&launch.args)
            .current_dir(self.inner.workspace.root())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::BackendLaunch(format!("{}: {}", launch.program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::BackendLaunch("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::BackendLaunch("Failed to get stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            let task = tokio::spawn(forward_stderr(self.language(), stderr));
            lock(&self.inner.tasks).push(task);
        }

        *self.inner.process.lock().await = Some(child);
        self.attach(stdout, stdin).await;
        self.handshake_or_teardown().await
    }

    /// Start a session over already connected streams instead of a child process
    pub async fn start_with_streams<R, W>(
        config: SessionConfig,
        reader: R,
        writer: W,
    ) -> SessionResult<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let session = Self::new(config)?;
        session.attach(reader, writer).await;
        session.handshake_or_teardown().await?;
        Ok(session)
    }

    async fn attach<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        *self.inner.writer.lock().await = Some(Box::new(writer));
        let task = tokio::spawn(read_loop(
            Arc::downgrade(&self.inner),
            MessageReader::new(reader),
        ));
        lock(&self.inner.tasks).push(task);
    }

    async fn handshake_or_teardown(&self) -> SessionResult<()> {
        match self.handshake().await {
            Ok(()) => {
                self.inner.state.send_replace(SessionState::Running);
                tracing::info!("{} language server started", self.language());
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{} handshake failed: {}", self.language(), e);
                self.stop().await;
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> SessionResult<()> {
        let root = self.inner.workspace.root();
        let root_uri = path_to_uri(root);
        let folder_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(root_uri.clone()),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: root_uri,
                name: folder_name,
            }]),
            capabilities: client_capabilities(),
            client_info: Some(ClientInfo {
                name: "lsp-bridge".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        };

        let value = self
            .inner
            .call("initialize", Some(serde_json::to_value(params)?))
            .await
            .map_err(|e| match e {
                SessionError::RequestTimeout { timeout, .. } => SessionError::Handshake(format!(
                    "no initialize response within {}ms",
                    timeout.as_millis()
                )),
                SessionError::SessionClosed => SessionError::Handshake(
                    "backend exited before completing initialize".to_string(),
                ),
                other => SessionError::Handshake(other.to_string()),
            })?;

        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| SessionError::Handshake(format!("malformed initialize result: {}", e)))?;
        if let Some(info) = &result.server_info {
            tracing::debug!(
                "Connected to {} {}",
                info.name,
                info.version.as_deref().unwrap_or("")
            );
        }
        *write(&self.inner.server) = Some(result);

        self.inner
            .notify("initialized", Some(json!({})))
            .await
            .map_err(|e| SessionError::Handshake(e.to_string()))
    }

    /// Shut the backend down; later calls are no-ops
    pub async fn stop(&self) {
        let inner = &self.inner;
        if inner.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        if self.state() == SessionState::Running {
            match inner.call("shutdown", None).await {
                Ok(_) => {
                    if let Err(e) = inner.notify("exit", None).await {
                        tracing::debug!("{} exit notification failed: {}", self.language(), e);
                    }
                }
                Err(e) => tracing::debug!("{} shutdown request failed: {}", self.language(), e),
            }
        }

        inner.state.send_replace(SessionState::Stopped);

        // Closing stdin signals EOF to the backend
        inner.writer.lock().await.take();

        if let Some(mut child) = inner.process.lock().await.take() {
            let grace = inner.config.timeouts.shutdown_grace;
            match timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!("{} language server exited: {}", self.language(), status);
                }
                Ok(Err(e)) => {
                    tracing::warn!("{} language server wait error: {}", self.language(), e);
                    let _ = child.kill().await;
                }
                Err(_) => {
                    tracing::warn!(
                        "{} language server did not exit within {}ms, forcing kill",
                        self.language(),
                        grace.as_millis()
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!("{} kill failed: {}", self.language(), e);
                    }
                }
            }
        }

        inner.fail_pending();
        inner.clear_documents();
        for task in lock(&inner.tasks).drain(..) {
            task.abort();
        }

        tracing::info!("{} language server stopped", self.language());
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Resolves once the session reaches `Stopped`
    pub async fn closed(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|s| *s == SessionState::Stopped).await;
    }

    pub fn language(&self) -> Language {
        self.inner.config.code_language
    }

    pub fn workspace_root(&self) -> &Path {
        self.inner.workspace.root()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    fn ensure_running(&self) -> SessionResult<()> {
        match self.state() {
            SessionState::Running => Ok(()),
            _ => Err(SessionError::SessionClosed),
        }
    }

    // ========================================================================
    // Open files
    // ========================================================================

    /// Open a workspace file, or add a claim to an already open one
    pub async fn open_file(&self, path: impl AsRef<Path>) -> SessionResult<OpenFileHandle> {
        self.ensure_running()?;
        let path = path.as_ref();
        let key = self.inner.workspace.relative_key(path)?;
        if lock(&self.inner.documents).acquire(&key) {
            return Ok(OpenFileHandle::new(self.clone(), key));
        }

        let (key, absolute) = self.inner.workspace.resolve_existing(path)?;
        let text = tokio::fs::read_to_string(&absolute).await?;
        let uri = path_to_uri(&absolute);
        {
            let mut documents = lock(&self.inner.documents);
            if documents.acquire(&key) {
                return Ok(OpenFileHandle::new(self.clone(), key));
            }
            documents.insert(key.clone(), DocumentEntry::from_disk(uri.clone(), text.clone()));
        }
        let handle = OpenFileHandle::new(self.clone(), key);
        self.send_did_open(uri, text).await?;

        tracing::debug!("Opened {}", handle.path().display());
        Ok(handle)
    }

    /// Open a document from `text` instead of the file on disk.
    ///
    /// `path` names the document inside the workspace and need not exist.
    /// Opening a path that is already open replaces its text, and the
    /// document is no longer refreshed from disk.
    pub async fn open_contents(
        &self,
        path: impl AsRef<Path>,
        text: impl Into<String>,
    ) -> SessionResult<OpenFileHandle> {
        self.ensure_running()?;
        let key = self.inner.workspace.relative_key(path.as_ref())?;
        let text = text.into();
        let uri = path_to_uri(&self.inner.workspace.absolute(&key));

        let reopened = {
            let mut documents = lock(&self.inner.documents);
            if documents.acquire(&key) {
                if let Some(entry) = documents.get_mut(&key) {
                    entry.on_disk = false;
                }
                true
            } else {
                documents.insert(key.clone(), DocumentEntry::in_memory(uri.clone(), text.clone()));
                false
            }
        };
        let handle = OpenFileHandle::new(self.clone(), key);

        if reopened {
            self.apply_text(handle.path(), text).await?;
        } else {
            self.send_did_open(uri, text).await?;
            tracing::debug!("Opened {} from contents", handle.path().display());
        }
        Ok(handle)
    }

    /// Re-read an open file from disk and forward any change to the backend.
    ///
    /// Returns whether the buffered text changed. Documents opened from
    /// contents are left as they are.
    pub async fn refresh_file(&self, path: impl AsRef<Path>) -> SessionResult<bool> {
        self.ensure_running()?;
        let path = path.as_ref();
        let key = self.inner.workspace.relative_key(path)?;
        let on_disk = lock(&self.inner.documents).get(&key).map(|e| e.on_disk);
        match on_disk {
            None => return Err(SessionError::NotOpen(path.to_path_buf())),
            Some(false) => return Ok(false),
            Some(true) => {}
        }

        let (_, absolute) = self.inner.workspace.resolve_existing(&key)?;
        let text = tokio::fs::read_to_string(&absolute).await?;
        self.apply_text(&key, text).await
    }

    async fn send_did_open(&self, uri: String, text: String) -> SessionResult<()> {
        let item = TextDocumentItem {
            uri,
            language_id: self.language().lsp_id().to_string(),
            version: 1,
            text,
        };
        self.inner
            .notify("textDocument/didOpen", Some(json!({ "textDocument": item })))
            .await
    }

    /// Full-text `didChange` when `text` differs from the buffer
    async fn apply_text(&self, key: &Path, text: String) -> SessionResult<bool> {
        let changed = lock(&self.inner.documents).update(key, text.clone());
        let Some((uri, version)) = changed else {
            return Ok(false);
        };
        let params = json!({
            "textDocument": { "uri": uri, "version": version },
            "contentChanges": [{ "text": text }],
        });
        self.inner
            .notify("textDocument/didChange", Some(params))
            .await?;
        tracing::debug!("Updated {} to version {}", key.display(), version);
        Ok(true)
    }

    /// Bring a document up to date before a request reads positions in it
    async fn sync_from_disk(&self, key: &Path) {
        if let Err(e) = self.refresh_file(key).await {
            tracing::debug!("Keeping buffered {}: {}", key.display(), e);
        }
    }

    /// Buffered text of an open file
    pub fn get_open_file_text(&self, path: impl AsRef<Path>) -> SessionResult<String> {
        self.open_entry(path.as_ref(), |entry| entry.text.clone())
    }

    /// Version last sent to the backend for an open file
    pub fn open_file_version(&self, path: impl AsRef<Path>) -> SessionResult<i32> {
        self.open_entry(path.as_ref(), |entry| entry.version)
    }

    fn open_entry<T>(&self, path: &Path, read: impl FnOnce(&DocumentEntry) -> T) -> SessionResult<T> {
        if self.state() == SessionState::Stopped {
            return Err(SessionError::SessionClosed);
        }
        let key = self.inner.workspace.relative_key(path)?;
        lock(&self.inner.documents)
            .get(&key)
            .map(read)
            .ok_or_else(|| SessionError::NotOpen(path.to_path_buf()))
    }

    pub(crate) async fn release_document(&self, key: &Path) -> SessionResult<()> {
        let removed = lock(&self.inner.documents).release(key);
        match removed {
            Some(entry) if self.is_running() => {
                self.inner
                    .notify(
                        "textDocument/didClose",
                        Some(json!({ "textDocument": TextDocumentIdentifier::new(entry.uri) })),
                    )
                    .await?;
                tracing::debug!("Closed {}", key.display());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn release_document_detached(&self, key: &Path) {
        let Some(entry) = lock(&self.inner.documents).release(key) else {
            return;
        };
        if !self.is_running() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime to close {}", key.display());
            return;
        };

        let inner = Arc::clone(&self.inner);
        let key = key.to_path_buf();
        runtime.spawn(async move {
            let params = json!({ "textDocument": TextDocumentIdentifier::new(entry.uri) });
            match inner.notify("textDocument/didClose", Some(params)).await {
                Ok(()) => tracing::debug!("Closed {}", key.display()),
                Err(e) => tracing::debug!("didClose for {} failed: {}", key.display(), e),
            }
        });
    }

    fn document_uri(&self, key: &Path) -> SessionResult<String> {
        lock(&self.inner.documents)
            .get(key)
            .map(|entry| entry.uri.clone())
            .ok_or_else(|| SessionError::NotOpen(key.to_path_buf()))
    }

    /// Check a position against the buffered text; returns the document uri
    fn validate_position(&self, key: &Path, line: u32, column: u32) -> SessionResult<String> {
        let documents = lock(&self.inner.documents);
        let entry = documents
            .get(key)
            .ok_or_else(|| SessionError::NotOpen(key.to_path_buf()))?;

        let invalid = |reason: String| SessionError::InvalidPosition {
            path: key.to_path_buf(),
            line,
            column,
            reason,
        };

        let Some(text) = nth_line(&entry.text, line) else {
            return Err(invalid(format!(
                "file has {} lines",
                line_count(&entry.text)
            )));
        };
        let width = utf16_len(text);
        if column > width {
            return Err(invalid(format!(
                "line {} is {} UTF-16 code units long",
                line, width
            )));
        }
        Ok(entry.uri.clone())
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Go to definition at a zero-indexed line and UTF-16 column
    pub async fn request_definition(
        &self,
        path: impl AsRef<Path>,
        line: u32,
        column: u32,
    ) -> SessionResult<Vec<Location>> {
        let handle = self.open_file(path).await?;
        self.sync_from_disk(handle.path()).await;
        let outcome = self.definition_at(handle.path(), line, column).await;
        let closed = handle.close().await;
        let locations = outcome?;
        closed?;
        Ok(locations)
    }

    async fn definition_at(
        &self,
        key: &Path,
        line: u32,
        column: u32,
    ) -> SessionResult<Vec<Location>> {
        let uri = self.validate_position(key, line, column)?;
        let params = TextDocumentPositionParams {
            text_document: TextDocumentIdentifier::new(uri),
            position: Position::new(line, column),
        };
        let value = self
            .inner
            .call("textDocument/definition", Some(serde_json::to_value(params)?))
            .await?;
        convert::definition_locations(value, &self.inner.workspace)
    }

    /// Symbols defined in a document, nested when the backend supports it
    pub async fn request_document_symbols(
        &self,
        path: impl AsRef<Path>,
    ) -> SessionResult<Vec<Symbol>> {
        let handle = self.open_file(path).await?;
        self.sync_from_disk(handle.path()).await;
        let outcome = self.symbols_of(handle.path()).await;
        let closed = handle.close().await;
        let symbols = outcome?;
        closed?;
        Ok(symbols)
    }

    async fn symbols_of(&self, key: &Path) -> SessionResult<Vec<Symbol>> {
        let uri = self.document_uri(key)?;
        let params = json!({ "textDocument": TextDocumentIdentifier::new(uri) });
        let value = self
            .inner
            .call("textDocument/documentSymbol", Some(params))
            .await?;
        convert::document_symbols(value)
    }

    /// Last diagnostics the backend published for a file
    pub fn diagnostics(&self, path: impl AsRef<Path>) -> SessionResult<Vec<Diagnostic>> {
        if self.state() == SessionState::Stopped {
            return Err(SessionError::SessionClosed);
        }
        let key = self.inner.workspace.relative_key(path.as_ref())?;
        Ok(read(&self.inner.diagnostics)
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    pub fn info(&self) -> SessionInfo {
        let server = read(&self.inner.server);
        let server_info = server.as_ref().and_then(|s| s.server_info.clone());
        SessionInfo {
            language: self.language(),
            server_command: self.inner.launch.to_string(),
            workspace_root: self.workspace_root().to_path_buf(),
            state: self.state(),
            server_name: server_info.as_ref().map(|i| i.name.clone()),
            server_version: server_info.and_then(|i| i.version),
            capabilities: server
                .as_ref()
                .map(|s| s.capabilities.clone())
                .unwrap_or(Value::Null),
            open_files: lock(&self.inner.documents).len(),
        }
    }

    #[cfg(test)]
    pub(crate) fn open_count(&self, path: impl AsRef<Path>) -> usize {
        lock(&self.inner.documents).open_count(path.as_ref())
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        lock(&self.inner.pending).len()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("language", &self.language())
            .field("root", &self.workspace_root())
            .field("state", &self.state())
            .finish()
    }
}

impl SessionInner {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn language(&self) -> Language {
        self.config.code_language
    }

    /// Send a request and wait for its response or timeout
    async fn call(self: &Arc<Self>, method: &str, params: Option<Value>) -> SessionResult<Value> {
        if self.state() == SessionState::Stopped {
            return Err(SessionError::SessionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(RequestId::Number(id), tx);
        let mut slot = PendingSlot {
            inner: Arc::downgrade(self),
            id,
            settled: false,
        };

        tracing::trace!("{} LSP request {}: {}", self.language(), id, method);
        self.send(&Request::new(id, method, params)).await?;

        let limit = self.config.timeout_for(method);
        match timeout(limit, rx).await {
            Ok(Ok(response)) => {
                slot.settled = true;
                response.into_result().map_err(SessionError::from)
            }
            Ok(Err(_)) => {
                slot.settled = true;
                Err(SessionError::SessionClosed)
            }
            Err(_) => {
                tracing::debug!("{} request {} '{}' timed out", self.language(), id, method);
                Err(SessionError::RequestTimeout {
                    method: method.to_string(),
                    timeout: limit,
                })
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> SessionResult<()> {
        self.send(&Notification::new(method, params)).await
    }

    async fn send<T: Serialize>(&self, message: &T) -> SessionResult<()> {
        let mut writer = self.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(SessionError::SessionClosed);
        };
        if let Err(e) = write_message(stream, message).await {
            writer.take();
            drop(writer);
            self.mark_failed(&e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Unrecoverable transport failure
    fn mark_failed(&self, reason: &dyn std::fmt::Display) {
        let previous = self.state.send_replace(SessionState::Stopped);
        if previous != SessionState::Stopped {
            tracing::error!("{} language server connection lost: {}", self.language(), reason);
        }
        self.fail_pending();
        self.clear_documents();
    }

    fn clear_documents(&self) {
        lock(&self.documents).clear();
        write(&self.diagnostics).clear();
    }

    /// Dropping the senders wakes every waiter with `SessionClosed`
    fn fail_pending(&self) {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        if !drained.is_empty() {
            tracing::debug!("Cancelling {} pending requests", drained.len());
        }
    }

    fn handle_message(self: &Arc<Self>, message: Message) {
        match message {
            Message::Response(response) => self.complete(response),
            Message::Request(request) => {
                let response = self.answer_server_request(&request);
                let inner = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = inner.send(&response).await {
                        tracing::debug!("Failed to answer server request: {}", e);
                    }
                });
            }
            Message::Notification(notification) => self.handle_notification(notification),
        }
    }

    fn complete(&self, response: Response) {
        let Some(id) = response.id.clone() else {
            tracing::debug!("Response without id: {:?}", response.error);
            return;
        };

        let sender = {
            let mut pending = lock(&self.pending);
            pending.remove(&id).or_else(|| match &id {
                RequestId::String(s) => s
                    .parse::<u64>()
                    .ok()
                    .and_then(|n| pending.remove(&RequestId::Number(n))),
                RequestId::Number(_) => None,
            })
        };

        match sender {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => tracing::debug!("Discarding response for unknown or expired request {}", id),
        }
    }

    fn answer_server_request(&self, request: &Request) -> Response {
        let id = request.id.clone();
        match request.method.as_str() {
            "workspace/configuration" => {
                let items = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("items"))
                    .and_then(Value::as_array)
                    .map(Vec::len)
                    .unwrap_or(0);
                Response::success(id, Value::Array(vec![json!({}); items]))
            }
            "client/registerCapability"
            | "client/unregisterCapability"
            | "window/workDoneProgress/create" => Response::success(id, Value::Null),
            method => {
                tracing::debug!("Unhandled server request: {}", method);
                Response::error(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                )
            }
        }
    }

    fn handle_notification(&self, notification: Notification) {
        let params = notification.params.unwrap_or(Value::Null);
        match notification.method.as_str() {
            "textDocument/publishDiagnostics" => self.store_diagnostics(&params),
            "window/logMessage" | "window/showMessage" => {
                log_backend_message(self.language(), &params)
            }
            "$/progress" => {
                if let Some(update) = ProgressUpdate::from_params(&params) {
                    tracing::debug!(
                        "{} progress [{}] {}%{}",
                        self.language(),
                        update.token,
                        update.progress,
                        update
                            .message
                            .map(|m| format!(" {}", m))
                            .unwrap_or_default()
                    );
                }
            }
            other => tracing::trace!("Ignoring notification: {}", other),
        }
    }

    fn store_diagnostics(&self, params: &Value) {
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return;
        };
        let diagnostics: Vec<Diagnostic> = params
            .get("diagnostics")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Diagnostic::from_lsp).collect())
            .unwrap_or_default();

        if self.state() == SessionState::Stopped {
            return;
        }
        let key = self.workspace.display_path(&uri_to_path(uri));
        tracing::debug!("Cached {} diagnostics for {}", diagnostics.len(), key.display());
        write(&self.diagnostics).insert(key, diagnostics);
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(child) = self.process.get_mut().as_mut() {
            match child.start_kill() {
                Ok(()) => tracing::warn!("Session dropped without stop, killed language server"),
                Err(e) => tracing::debug!("Kill on drop failed: {}", e),
            }
        }
        let tasks = self
            .tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

/// Outstanding request slot; removes itself and cancels unless settled
struct PendingSlot {
    inner: Weak<SessionInner>,
    id: u64,
    settled: bool,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let removed = lock(&inner.pending)
            .remove(&RequestId::Number(self.id))
            .is_some();
        if !removed || inner.state() == SessionState::Stopped {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let id = self.id;
        runtime.spawn(async move {
            if let Err(e) = inner
                .notify("$/cancelRequest", Some(json!({ "id": id })))
                .await
            {
                tracing::debug!("Failed to cancel request {}: {}", id, e);
            }
        });
    }
}

async fn read_loop<R: AsyncRead + Unpin>(weak: Weak<SessionInner>, mut reader: MessageReader<R>) {
    loop {
        let result = reader.read_message().await;
        let Some(inner) = weak.upgrade() else {
            break;
        };
        match result {
            Ok(message) => inner.handle_message(message),
            Err(e) if is_malformed_body(&e) => {
                tracing::warn!("Discarding malformed LSP message: {}", e);
            }
            Err(e) => {
                inner.mark_failed(&e);
                break;
            }
        }
    }
}

/// A well-framed message whose JSON could not be understood
fn is_malformed_body(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::InvalidData
        && err
            .get_ref()
            .is_some_and(|inner| {
                inner.is::<serde_json::Error>() || inner.is::<std::string::FromUtf8Error>()
            })
}

async fn forward_stderr(language: Language, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!("{} stderr: {}", language, line);
    }
}

fn log_backend_message(language: Language, params: &Value) {
    let Ok(LogMessageParams { typ, message }) = serde_json::from_value(params.clone()) else {
        tracing::trace!("Malformed log message: {}", params);
        return;
    };
    match typ {
        MessageType::Error => tracing::error!("LSP {}: {}", language, message),
        MessageType::Warning => tracing::warn!("LSP {}: {}", language, message),
        MessageType::Info => tracing::info!("LSP {}: {}", language, message),
        MessageType::Log | MessageType::Debug => tracing::debug!("LSP {}: {}", language, message),
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &StdRwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &StdRwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
