//! Diagnostic model for published server diagnostics

use serde::{Deserialize, Serialize};

use super::lsp::Range;

/// Diagnostic reported through `textDocument/publishDiagnostics`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: DiagnosticSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Diagnostic {
    /// Build from a raw LSP diagnostic object, skipping malformed entries
    pub fn from_lsp(value: &serde_json::Value) -> Option<Self> {
        let range: Range = serde_json::from_value(value.get("range")?.clone()).ok()?;
        let message = value.get("message")?.as_str()?.to_string();
        let severity = value
            .get("severity")
            .and_then(|s| s.as_i64())
            .map(DiagnosticSeverity::from_lsp)
            .unwrap_or(DiagnosticSeverity::Error);
        let code = value.get("code").and_then(|c| match c {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let source = value
            .get("source")
            .and_then(|s| s.as_str())
            .map(String::from);

        Some(Self {
            range,
            severity,
            message,
            code,
            source,
        })
    }
}

/// Severity levels (matches LSP numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    pub fn from_lsp(value: i64) -> Self {
        match value {
            1 => Self::Error,
            2 => Self::Warning,
            3 => Self::Information,
            _ => Self::Hint,
        }
    }
}

impl std::fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Information => write!(f, "info"),
            Self::Hint => write!(f, "hint"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_lsp_full() {
        let raw = json!({
            "range": {"start": {"line": 3, "character": 4}, "end": {"line": 3, "character": 9}},
            "severity": 2,
            "code": 401,
            "source": "pyflakes",
            "message": "'os' imported but unused"
        });
        let diag = Diagnostic::from_lsp(&raw).unwrap();
        assert_eq!(diag.severity, DiagnosticSeverity::Warning);
        assert_eq!(diag.code.as_deref(), Some("401"));
        assert_eq!(diag.source.as_deref(), Some("pyflakes"));
        assert_eq!(diag.range.start.line, 3);
    }

    #[test]
    fn test_from_lsp_defaults_to_error() {
        let raw = json!({
            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}},
            "message": "syntax error"
        });
        let diag = Diagnostic::from_lsp(&raw).unwrap();
        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.severity.to_string(), "error");
    }

    #[test]
    fn test_from_lsp_rejects_missing_range() {
        assert!(Diagnostic::from_lsp(&json!({"message": "x"})).is_none());
    }
}
