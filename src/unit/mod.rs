//! Processing units: the pluggable capability that turns a raw payload into
//! requirements.
//!
//! A unit does two things. It parses and validates the raw bytes into its
//! own input type, which is a client concern (a failure is the caller's
//! fault). Then it processes that input, which is a server concern (a
//! failure is ours).

pub mod schema;
pub mod stub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use schema::{FieldKind, Schema, SchemaField};
pub use stub::{ModelDefinition, StubModel};

/// A processing unit the consumer can delegate to.
#[async_trait]
pub trait ProcessingUnit: Send + Sync + 'static {
    /// Validated input handed to [`process`](ProcessingUnit::process).
    type Input: Send + 'static;

    /// Parse and validate a raw payload.
    fn parse_and_validate(&self, raw: &[u8]) -> Result<Self::Input, ValidationErrors>;

    /// Produce the requirements for a validated input.
    async fn process(&self, input: Self::Input) -> anyhow::Result<Vec<String>>;
}

/// A single validation failure, located by its path in the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ValidationIssue {
    pub fn new(loc: &[&str], msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            loc: loc.iter().map(|s| s.to_string()).collect(),
            msg: msg.into(),
            kind: kind.into(),
        }
    }
}

/// All issues found in one payload. Never empty when returned as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(transparent)]
#[error("{} validation error(s): {}", .0.len(), summary(.0))]
pub struct ValidationErrors(pub Vec<ValidationIssue>);

impl ValidationErrors {
    pub fn single(issue: ValidationIssue) -> Self {
        Self(vec![issue])
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.0
    }

    /// The structured form stored as the error document's `details`.
    pub fn to_details(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn summary(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{}: {}", issue.loc.join("."), issue.msg))
        .collect::<Vec<_>>()
        .join("; ")
}
