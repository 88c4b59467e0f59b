//! Session-backed tool table

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;

use super::paginate::paginate;
use super::registry::{ParamSpec, ParamType, ToolArgs, ToolHandler, ToolRegistry, ToolSpec};
use crate::error::{BridgeResult, ConfigError, SessionError};
use crate::infra::lsp::{OpenFileHandle, Session};
use crate::models::symbol::Symbol;

pub const REQUEST_DEFINITION: &str = "request_definition";
pub const REQUEST_DOCUMENT_SYMBOLS: &str = "request_document_symbols";
pub const READ_FILE: &str = "read_file";
pub const OPEN_FILE_CONTENTS: &str = "open_file_contents";
pub const GET_DIAGNOSTICS: &str = "get_diagnostics";
pub const LSP_INFO: &str = "lsp_info";

/// Every tool the bridge can expose, in listing order
pub const TOOL_NAMES: [&str; 6] = [
    REQUEST_DEFINITION,
    REQUEST_DOCUMENT_SYMBOLS,
    READ_FILE,
    OPEN_FILE_CONTENTS,
    GET_DIAGNOSTICS,
    LSP_INFO,
];

const NON_NEGATIVE: ParamType = ParamType::Integer { min: Some(0) };
const PATH: ParamSpec = ParamSpec::required(
    "path",
    ParamType::String,
    "File path relative to the workspace root",
);

/// Reject allowlist entries that name no known tool
pub fn validate_allowlist(names: &[String]) -> Result<(), ConfigError> {
    match names.iter().find(|n| !TOOL_NAMES.contains(&n.as_str())) {
        Some(unknown) => Err(ConfigError::invalid(
            "bridge.tools",
            format!(
                "unknown tool '{}' (available: {})",
                unknown,
                TOOL_NAMES.join(", ")
            ),
        )),
        None => Ok(()),
    }
}

/// Registry of session tools, restricted to `allowlist` when given
pub fn session_registry(session: &Session, allowlist: Option<&[String]>) -> BridgeResult<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for spec in session_tools(session) {
        let allowed = allowlist.is_none_or(|names| names.iter().any(|n| n == spec.name));
        if allowed {
            registry.register(spec)?;
        }
    }
    Ok(registry)
}

/// Documents opened through `open_file_contents`, held until the bridge goes away
type HeldDocuments = Arc<Mutex<HashMap<PathBuf, OpenFileHandle>>>;

pub fn session_tools(session: &Session) -> Vec<ToolSpec> {
    let held = HeldDocuments::default();
    vec![
        ToolSpec {
            name: REQUEST_DEFINITION,
            description: "Go to definition at a zero-indexed line and UTF-16 column",
            params: vec![
                PATH,
                ParamSpec::required("line", NON_NEGATIVE, "Zero-indexed line"),
                ParamSpec::required("column", NON_NEGATIVE, "Zero-indexed UTF-16 column"),
            ],
            handler: bind(session, request_definition),
        },
        ToolSpec {
            name: REQUEST_DOCUMENT_SYMBOLS,
            description: "Symbols defined in a document, nested when the backend supports it",
            params: vec![
                PATH,
                ParamSpec::optional(
                    "page",
                    NON_NEGATIVE,
                    "Zero-based page of 10 symbols; omit for all",
                ),
                ParamSpec::optional(
                    "flat",
                    ParamType::Boolean,
                    "Flatten nested symbols into one list",
                ),
            ],
            handler: bind(session, request_document_symbols),
        },
        ToolSpec {
            name: READ_FILE,
            description: "Contents of a workspace file as sent to the language server",
            params: vec![PATH],
            handler: bind(session, read_file),
        },
        ToolSpec {
            name: OPEN_FILE_CONTENTS,
            description: "Open a document from the given contents so the other tools can use it without a file on disk; calling again with the same path replaces the contents",
            params: vec![
                ParamSpec::required(
                    "path",
                    ParamType::String,
                    "Workspace-relative name for the document",
                ),
                ParamSpec::required("contents", ParamType::String, "Full document text"),
            ],
            handler: bind(session, move |session, args| {
                open_file_contents(session, Arc::clone(&held), args)
            }),
        },
        ToolSpec {
            name: GET_DIAGNOSTICS,
            description: "Last diagnostics the backend published for a file",
            params: vec![PATH],
            handler: bind(session, get_diagnostics),
        },
        ToolSpec {
            name: LSP_INFO,
            description: "Language, server command, workspace root and capabilities of the running language server",
            params: Vec::new(),
            handler: bind(session, lsp_info),
        },
    ]
}

fn bind<F, Fut>(session: &Session, run: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Session, ToolArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BridgeResult<Value>> + Send + 'static,
{
    let session = session.clone();
    Arc::new(move |args: ToolArgs| run(session.clone(), args))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> BridgeResult<Value> {
    Ok(serde_json::to_value(value).map_err(SessionError::from)?)
}

async fn request_definition(session: Session, args: ToolArgs) -> BridgeResult<Value> {
    let locations = session
        .request_definition(args.str("path")?, args.u32("line")?, args.u32("column")?)
        .await?;
    to_json(&locations)
}

async fn request_document_symbols(session: Session, args: ToolArgs) -> BridgeResult<Value> {
    let mut symbols = session.request_document_symbols(args.str("path")?).await?;
    if args.flag("flat") {
        symbols = Symbol::flatten(&symbols);
    }
    match args.opt_usize("page") {
        Some(page) => paginate(&symbols, page),
        None => to_json(&symbols),
    }
}

async fn read_file(session: Session, args: ToolArgs) -> BridgeResult<Value> {
    let handle = session.open_file(args.str("path")?).await?;
    let text = handle.text();
    handle.close().await?;
    Ok(Value::String(text?))
}

async fn open_file_contents(
    session: Session,
    held: HeldDocuments,
    args: ToolArgs,
) -> BridgeResult<Value> {
    let handle = session
        .open_contents(args.str("path")?, args.str("contents")?)
        .await?;
    let key = handle.path().to_path_buf();
    let version = session.open_file_version(&key)?;

    let previous = held
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key.clone(), handle);
    if let Some(previous) = previous {
        previous.close().await?;
    }

    Ok(serde_json::json!({ "path": key, "version": version }))
}

async fn get_diagnostics(session: Session, args: ToolArgs) -> BridgeResult<Value> {
    to_json(&session.diagnostics(args.str("path")?)?)
}

async fn lsp_info(session: Session, _args: ToolArgs) -> BridgeResult<Value> {
    to_json(&session.info())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::infra::lsp::fake::{FakeBackend, MAIN_PY, Reply, python_workspace, start_fake};
    use crate::models::lsp::path_to_uri;
    use serde_json::json;

    #[test]
    fn test_allowlist_validation() {
        assert!(validate_allowlist(&["read_file".to_string()]).is_ok());
        let err = validate_allowlist(&["read_file".to_string(), "hover".to_string()]).unwrap_err();
        assert!(err.to_string().contains("hover"));
    }

    #[tokio::test]
    async fn test_descriptors_match_table() {
        let dir = python_workspace();
        let (session, _log) = start_fake(dir.path(), FakeBackend::new()).await;

        let registry = session_registry(&session, None).unwrap();
        let names: Vec<_> = registry.list_tools().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, TOOL_NAMES);

        let symbols = registry
            .list_tools()
            .into_iter()
            .find(|t| t.name == REQUEST_DOCUMENT_SYMBOLS)
            .unwrap();
        assert_eq!(
            symbols.description,
            "Symbols defined in a document, nested when the backend supports it"
        );
        assert_eq!(symbols.input_schema["required"], json!(["path"]));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_allowlist_restricts_registration() {
        let dir = python_workspace();
        let (session, _log) = start_fake(dir.path(), FakeBackend::new()).await;

        let allow = vec![READ_FILE.to_string(), LSP_INFO.to_string()];
        let registry = session_registry(&session, Some(&allow)).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(REQUEST_DEFINITION));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_negative_line_is_invalid_arguments() {
        let dir = python_workspace();
        let (session, log) = start_fake(dir.path(), FakeBackend::new()).await;
        let registry = session_registry(&session, None).unwrap();

        let err = registry
            .invoke(REQUEST_DEFINITION, json!({"line": -1, "column": 0, "path": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArguments { .. }));
        assert_eq!(log.count("textDocument/didOpen"), 0);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_definition_and_read_file_tools() {
        let dir = python_workspace();
        let uri = path_to_uri(&dir.path().join("main.py"));
        let backend = FakeBackend::new().on("textDocument/definition", move |_| {
            Reply::Result(json!({
                "uri": uri,
                "range": {"start": {"line": 2, "character": 4}, "end": {"line": 2, "character": 9}}
            }))
        });
        let (session, _log) = start_fake(dir.path(), backend).await;
        let registry = session_registry(&session, None).unwrap();

        let result = registry
            .invoke(REQUEST_DEFINITION, json!({"path": "main.py", "line": 7, "column": "5"}))
            .await
            .unwrap();
        assert_eq!(result[0]["file"], "main.py");
        assert_eq!(result[0]["line"], 2);

        let text = registry
            .invoke(READ_FILE, json!({"path": "main.py"}))
            .await
            .unwrap();
        assert_eq!(text, json!(MAIN_PY));
        assert_eq!(session.open_count("main.py"), 0);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_symbols_pagination() {
        let dir = python_workspace();
        let backend = FakeBackend::new().on("textDocument/documentSymbol", |_| {
            let range = json!({"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}});
            let symbols: Vec<Value> = (0..12)
                .map(|i| json!({"name": format!("s{}", i), "kind": 13, "range": range, "selectionRange": range}))
                .collect();
            Reply::Result(Value::Array(symbols))
        });
        let (session, _log) = start_fake(dir.path(), backend).await;
        let registry = session_registry(&session, None).unwrap();

        let all = registry
            .invoke(REQUEST_DOCUMENT_SYMBOLS, json!({"path": "main.py"}))
            .await
            .unwrap();
        assert_eq!(all.as_array().unwrap().len(), 12);

        let page = registry
            .invoke(REQUEST_DOCUMENT_SYMBOLS, json!({"path": "main.py", "page": 1}))
            .await
            .unwrap();
        assert_eq!(page["num_pages"], 2);
        assert_eq!(page["result"][0]["name"], "s10");

        let flat = registry
            .invoke(REQUEST_DOCUMENT_SYMBOLS, json!({"path": "main.py", "flat": true}))
            .await
            .unwrap();
        assert_eq!(flat.as_array().unwrap().len(), 12);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_open_file_contents_tool() {
        let dir = python_workspace();
        let (session, log) = start_fake(dir.path(), FakeBackend::new()).await;
        let registry = session_registry(&session, None).unwrap();

        let opened = registry
            .invoke(OPEN_FILE_CONTENTS, json!({"path": "scratch.py", "contents": "x = 1\n"}))
            .await
            .unwrap();
        assert_eq!(opened, json!({"path": "scratch.py", "version": 1}));

        // Stays open after the call so other tools can use it
        let text = registry
            .invoke(READ_FILE, json!({"path": "scratch.py"}))
            .await
            .unwrap();
        assert_eq!(text, json!("x = 1\n"));

        let replaced = registry
            .invoke(OPEN_FILE_CONTENTS, json!({"path": "scratch.py", "contents": "x = 2\n"}))
            .await
            .unwrap();
        assert_eq!(replaced["version"], 2);
        assert_eq!(session.open_count("scratch.py"), 1);
        assert_eq!(session.get_open_file_text("scratch.py").unwrap(), "x = 2\n");
        log.wait_for("textDocument/didChange", 1).await;
        assert_eq!(log.count("textDocument/didClose"), 0);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_session_errors_are_wrapped() {
        let dir = python_workspace();
        let (session, _log) = start_fake(dir.path(), FakeBackend::new()).await;
        let registry = session_registry(&session, None).unwrap();

        let err = registry
            .invoke(READ_FILE, json!({"path": "missing.py"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Session(SessionError::FileNotFound(_))));

        let info = registry.invoke(LSP_INFO, json!({})).await.unwrap();
        assert_eq!(info["language"], "python");
        assert_eq!(info["state"], "running");
        session.stop().await;
    }
}
