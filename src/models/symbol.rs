//! Symbol model definitions
//!
//! Core types for representing code symbols and locations reported by a
//! language server. Lines and columns are zero-indexed; columns count UTF-16
//! code units, matching the LSP default position encoding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::lsp::Range;

/// A symbol defined in a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Full extent of the definition
    pub range: Range,
    /// Span of the identifier itself
    pub selection_range: Range,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Symbol>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, range: Range) -> Self {
        Self {
            name: name.into(),
            kind,
            selection_range: range.clone(),
            range,
            container: None,
            detail: None,
            children: Vec::new(),
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_selection_range(mut self, range: Range) -> Self {
        self.selection_range = range;
        self
    }

    pub fn with_children(mut self, children: Vec<Symbol>) -> Self {
        self.children = children;
        self
    }

    /// Depth-first walk over a symbol forest.
    ///
    /// Children are unfolded only as the iterator advances.
    pub fn walk(symbols: &[Symbol]) -> SymbolWalk<'_> {
        SymbolWalk {
            stack: symbols.iter().rev().map(|s| (0, s)).collect(),
        }
    }

    /// Flattened copy of a symbol forest with children detached.
    pub fn flatten(symbols: &[Symbol]) -> Vec<Symbol> {
        Self::walk(symbols)
            .map(|(_, s)| Symbol {
                children: Vec::new(),
                ..s.clone()
            })
            .collect()
    }
}

pub struct SymbolWalk<'a> {
    stack: Vec<(usize, &'a Symbol)>,
}

impl<'a> Iterator for SymbolWalk<'a> {
    type Item = (usize, &'a Symbol);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, symbol) = self.stack.pop()?;
        self.stack
            .extend(symbol.children.iter().rev().map(|c| (depth + 1, c)));
        Some((depth, symbol))
    }
}

/// Symbol classification (closed set, mirrors the LSP enumeration)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    File,
    Module,
    Namespace,
    Package,
    Class,
    Method,
    Property,
    Field,
    Constructor,
    Enum,
    Interface,
    Function,
    Variable,
    Constant,
    String,
    Number,
    Boolean,
    Array,
    Object,
    Key,
    Null,
    EnumMember,
    Struct,
    Event,
    Operator,
    TypeParameter,
}

impl SymbolKind {
    /// Convert from LSP SymbolKind number
    pub fn from_lsp(kind: u32) -> Self {
        match kind {
            1 => Self::File,
            2 => Self::Module,
            3 => Self::Namespace,
            4 => Self::Package,
            5 => Self::Class,
            6 => Self::Method,
            7 => Self::Property,
            8 => Self::Field,
            9 => Self::Constructor,
            10 => Self::Enum,
            11 => Self::Interface,
            12 => Self::Function,
            13 => Self::Variable,
            14 => Self::Constant,
            15 => Self::String,
            16 => Self::Number,
            17 => Self::Boolean,
            18 => Self::Array,
            19 => Self::Object,
            20 => Self::Key,
            21 => Self::Null,
            22 => Self::EnumMember,
            23 => Self::Struct,
            24 => Self::Event,
            25 => Self::Operator,
            26 => Self::TypeParameter,
            _ => Self::Variable,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::File => "file",
            Self::Module => "module",
            Self::Namespace => "namespace",
            Self::Package => "package",
            Self::Class => "class",
            Self::Method => "method",
            Self::Property => "property",
            Self::Field => "field",
            Self::Constructor => "constructor",
            Self::Enum => "enum",
            Self::Interface => "interface",
            Self::Function => "function",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Key => "key",
            Self::Null => "null",
            Self::EnumMember => "enum_member",
            Self::Struct => "struct",
            Self::Event => "event",
            Self::Operator => "operator",
            Self::TypeParameter => "type_parameter",
        };
        write!(f, "{}", s)
    }
}

/// Languages with a known analyzer backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Rust,
    TypeScript,
    JavaScript,
    Go,
    Java,
    CSharp,
    Ruby,
    Dart,
    Kotlin,
}

impl Language {
    /// Language identifier used in `textDocument/didOpen`
    pub fn lsp_id(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Rust => "rust",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Go => "go",
            Self::Java => "java",
            Self::CSharp => "csharp",
            Self::Ruby => "ruby",
            Self::Dart => "dart",
            Self::Kotlin => "kotlin",
        }
    }

    pub fn all() -> &'static [Language] {
        &[
            Self::Python,
            Self::Rust,
            Self::TypeScript,
            Self::JavaScript,
            Self::Go,
            Self::Java,
            Self::CSharp,
            Self::Ruby,
            Self::Dart,
            Self::Kotlin,
        ]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lsp_id())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "py" => Ok(Self::Python),
            "rust" | "rs" => Ok(Self::Rust),
            "typescript" | "ts" => Ok(Self::TypeScript),
            "javascript" | "js" => Ok(Self::JavaScript),
            "go" | "golang" => Ok(Self::Go),
            "java" => Ok(Self::Java),
            "csharp" | "c#" | "cs" => Ok(Self::CSharp),
            "ruby" | "rb" => Ok(Self::Ruby),
            "dart" => Ok(Self::Dart),
            "kotlin" | "kt" => Ok(Self::Kotlin),
            _ => Err(format!("Unknown language: {}", s)),
        }
    }
}

/// Source location (zero-indexed)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    /// Workspace-relative path when inside the root, absolute otherwise
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Location {
    pub fn from_range(file: PathBuf, range: &Range) -> Self {
        Self {
            file,
            line: range.start.line,
            column: range.start.character,
            end_line: range.end.line,
            end_column: range.end.character,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lsp::Position;

    fn range(line: u32) -> Range {
        Range::new(Position::new(line, 0), Position::new(line, 10))
    }

    fn tree() -> Vec<Symbol> {
        vec![
            Symbol::new("Greeter", SymbolKind::Class, range(0)).with_children(vec![
                Symbol::new("__init__", SymbolKind::Method, range(1)).with_container("Greeter"),
                Symbol::new("greet", SymbolKind::Method, range(3)).with_container("Greeter"),
            ]),
            Symbol::new("main", SymbolKind::Function, range(6)),
        ]
    }

    #[test]
    fn test_walk_is_depth_first() {
        let symbols = tree();
        let walked: Vec<_> = Symbol::walk(&symbols)
            .map(|(depth, s)| (depth, s.name.as_str()))
            .collect();
        assert_eq!(
            walked,
            vec![(0, "Greeter"), (1, "__init__"), (1, "greet"), (0, "main")]
        );
    }

    #[test]
    fn test_walk_is_lazy() {
        let symbols = tree();
        let mut walk = Symbol::walk(&symbols);
        assert_eq!(walk.next().map(|(_, s)| s.name.as_str()), Some("Greeter"));
        // Only the first root has been unfolded so far
        assert_eq!(walk.stack.len(), 3);
    }

    #[test]
    fn test_flatten_detaches_children() {
        let flat = Symbol::flatten(&tree());
        assert_eq!(flat.len(), 4);
        assert!(flat.iter().all(|s| s.children.is_empty()));
        assert_eq!(flat[1].container.as_deref(), Some("Greeter"));
    }

    #[test]
    fn test_symbol_kind_from_lsp() {
        assert_eq!(SymbolKind::from_lsp(12), SymbolKind::Function);
        assert_eq!(SymbolKind::from_lsp(5), SymbolKind::Class);
        assert_eq!(SymbolKind::from_lsp(999), SymbolKind::Variable);
        assert_eq!(SymbolKind::EnumMember.to_string(), "enum_member");
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("python".parse::<Language>(), Ok(Language::Python));
        assert_eq!("TS".parse::<Language>(), Ok(Language::TypeScript));
        assert_eq!("c#".parse::<Language>(), Ok(Language::CSharp));
        assert!("cobol".parse::<Language>().is_err());
        assert_eq!(Language::all().len(), 10);
    }

    #[test]
    fn test_language_serde_lowercase() {
        let json = serde_json::to_string(&Language::TypeScript).unwrap();
        assert_eq!(json, "\"typescript\"");
        let lang: Language = serde_json::from_str("\"csharp\"").unwrap();
        assert_eq!(lang, Language::CSharp);
    }

    #[test]
    fn test_location_from_range() {
        let loc = Location::from_range(PathBuf::from("main.py"), &range(2));
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column, 0);
        assert_eq!(loc.end_column, 10);
        assert_eq!(loc.to_string(), "main.py:2:0");
    }
}
