//! Result and error documents stored under the bare task key.

use serde::{Deserialize, Serialize};

/// Error code for payloads rejected by schema validation.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";

/// Error code for faults raised while processing a valid payload.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Structured error stored for CLIENT_ERROR / SERVER_ERROR tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorRecord {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// The document a caller reads once a task is terminal.
///
/// Serialized as `{"requirements": [...]}` or `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskDocument {
    Success { requirements: Vec<String> },
    Failure { error: ErrorRecord },
}

impl TaskDocument {
    pub fn success(requirements: &[String]) -> Self {
        TaskDocument::Success {
            requirements: requirements.to_vec(),
        }
    }

    pub fn failure(error: ErrorRecord) -> Self {
        TaskDocument::Failure { error }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
