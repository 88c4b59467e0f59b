//! Output formatting for CLI commands
//!
//! Every command prints exactly one JSON document on stdout; logs go to
//! stderr.

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::SessionError;

/// Output context for consistent formatting across commands
#[derive(Debug, Clone)]
pub struct OutputContext {
    pretty: bool,
}

impl OutputContext {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Print a successful response with data fields at the top level
    pub fn print_success_flat<T: Serialize>(&self, data: T) {
        self.print(&success_envelope(data));
    }

    pub fn print_error(&self, kind: &str, message: &str) {
        self.print(&error_envelope(kind, message));
    }

    /// Request failures are printed as an error envelope. Failures that kept
    /// the session from ever starting are returned to the caller instead.
    pub fn report_session_error(&self, error: SessionError) -> anyhow::Result<()> {
        if error.is_setup_failure() {
            return Err(error.into());
        }
        tracing::debug!("Request failed: {}", error);
        self.print_error(error.kind(), &error.to_string());
        Ok(())
    }

    fn print(&self, value: &Value) {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        match rendered {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to serialize output: {e}"),
        }
    }
}

pub fn success_envelope<T: Serialize>(data: T) -> Value {
    let mut response = serde_json::to_value(data).unwrap_or_else(|_| json!({}));
    match response.as_object_mut() {
        Some(obj) => {
            obj.insert("success".to_string(), json!(true));
            response
        }
        None => json!({ "success": true, "data": response }),
    }
}

pub fn error_envelope(kind: &str, message: &str) -> Value {
    json!({
        "success": false,
        "error": message,
        "kind": kind,
    })
}
