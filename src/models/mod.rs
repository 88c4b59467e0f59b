//! Data models for lsp-bridge
//!
//! Contains core type definitions used throughout the application.

pub mod config;
pub mod diagnostic;
pub mod lsp;
pub mod symbol;

pub use config::FileConfig;
pub use diagnostic::{Diagnostic, DiagnosticSeverity};
pub use lsp::{Position, Range};
pub use symbol::{Language, Location, Symbol, SymbolKind};
