//! Work-done progress (`$/progress`) interpretation

use serde::Deserialize;
use serde_json::Value;

use super::protocol::RequestId;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum WorkDoneProgress {
    Begin {
        title: String,
        message: Option<String>,
        percentage: Option<u32>,
    },
    Report {
        message: Option<String>,
        percentage: Option<u32>,
    },
    End {
        message: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub token: RequestId,
    /// Percent complete out of 100
    pub progress: u32,
    pub message: Option<String>,
    pub done: bool,
}

impl ProgressUpdate {
    /// Interpret `$/progress` params; None for non work-done payloads
    pub fn from_params(params: &Value) -> Option<Self> {
        let token: RequestId = serde_json::from_value(params.get("token")?.clone()).ok()?;
        let value: WorkDoneProgress = serde_json::from_value(params.get("value")?.clone()).ok()?;

        let (progress, message, done) = match value {
            WorkDoneProgress::Begin {
                title,
                message,
                percentage,
            } => (percentage.unwrap_or(0), Some(message.unwrap_or(title)), false),
            WorkDoneProgress::Report {
                message,
                percentage,
            } => (percentage.unwrap_or(0), message, false),
            WorkDoneProgress::End { message } => (100, message, true),
        };

        Some(Self {
            token,
            progress: progress.min(100),
            message,
            done,
        })
    }
}
