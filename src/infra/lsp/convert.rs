//! Conversions from raw LSP results into domain models

use serde_json::Value;

use super::protocol::{DefinitionResponse, DocumentSymbol, DocumentSymbolResponse};
use super::workspace::Workspace;
use crate::error::{SessionError, SessionResult};
use crate::models::lsp::uri_to_path;
use crate::models::symbol::{Location, Symbol, SymbolKind};

/// Normalize every definition answer shape into locations
pub fn definition_locations(value: Value, workspace: &Workspace) -> SessionResult<Vec<Location>> {
    if value.is_null() {
        return Ok(Vec::new());
    }

    let response: DefinitionResponse = serde_json::from_value(value)
        .map_err(|e| SessionError::Protocol(format!("Malformed definition result: {}", e)))?;

    Ok(response
        .into_locations()
        .into_iter()
        .map(|loc| {
            let file = workspace.display_path(&uri_to_path(&loc.uri));
            Location::from_range(file, &loc.range)
        })
        .collect())
}

pub fn document_symbols(value: Value) -> SessionResult<Vec<Symbol>> {
    if value.is_null() {
        return Ok(Vec::new());
    }

    let response: DocumentSymbolResponse = serde_json::from_value(value)
        .map_err(|e| SessionError::Protocol(format!("Malformed documentSymbol result: {}", e)))?;

    Ok(match response {
        DocumentSymbolResponse::Nested(symbols) => symbols
            .into_iter()
            .map(|s| convert_nested(s, None))
            .collect(),
        DocumentSymbolResponse::Flat(symbols) => symbols
            .into_iter()
            .map(|info| {
                let symbol = Symbol::new(
                    info.name,
                    SymbolKind::from_lsp(info.kind),
                    info.location.range,
                );
                match info.container_name {
                    Some(container) if !container.is_empty() => symbol.with_container(container),
                    _ => symbol,
                }
            })
            .collect(),
    })
}

fn convert_nested(symbol: DocumentSymbol, container: Option<&str>) -> Symbol {
    let children = symbol
        .children
        .unwrap_or_default()
        .into_iter()
        .map(|child| convert_nested(child, Some(&symbol.name)))
        .collect();

    let mut converted = Symbol::new(
        symbol.name.clone(),
        SymbolKind::from_lsp(symbol.kind),
        symbol.range,
    )
    .with_selection_range(symbol.selection_range)
    .with_children(children);
    converted.detail = symbol.detail;
    if let Some(container) = container {
        converted = converted.with_container(container);
    }
    converted
}
