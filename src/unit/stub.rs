//! The stub model: greets a name from the payload after a simulated delay.
//!
//! Model definitions are TOML:
//!
//! ```toml
//! [model]
//! name = "test_model"
//! greeting_field = "test_field_name"
//! delay_ms = { min = 1000, max = 30000 }
//!
//! [model.schema]
//! name = "test_schema_name"
//!
//! [[model.schema.fields]]
//! name = "test_field_name"
//! type = "string"
//! ```

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::debug;

use super::{FieldKind, ProcessingUnit, Schema, SchemaField, ValidationErrors};
use crate::error::{Error, Result};

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ModelFile {
    model: ModelDefinition,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    /// Schema field whose string value is greeted.
    pub greeting_field: String,
    #[serde(default)]
    pub delay_ms: DelayRange,
    pub schema: Schema,
}

/// Bounds of the simulated processing delay, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

impl Default for ModelDefinition {
    fn default() -> Self {
        Self {
            name: "test_model".to_string(),
            greeting_field: "test_field_name".to_string(),
            delay_ms: DelayRange::default(),
            schema: Schema::new(
                "test_schema_name",
                vec![SchemaField::new("test_field_name", FieldKind::String)],
            ),
        }
    }
}

/// Validated input for [`StubModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubInput {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct StubModel {
    definition: ModelDefinition,
}

impl StubModel {
    pub fn new(definition: ModelDefinition) -> Result<Self> {
        match definition.schema.field(&definition.greeting_field) {
            Some(field) if field.kind == FieldKind::String && field.required => {}
            _ => {
                return Err(Error::Config(format!(
                    "model {}: greeting_field {:?} must be a required string field of schema {}",
                    definition.name, definition.greeting_field, definition.schema.name
                )));
            }
        }
        if definition.delay_ms.min > definition.delay_ms.max {
            return Err(Error::Config(format!(
                "model {}: delay_ms.min ({}) exceeds delay_ms.max ({})",
                definition.name, definition.delay_ms.min, definition.delay_ms.max
            )));
        }
        Ok(Self { definition })
    }

    /// Load a model definition from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read model config {}: {e}", path.display()))
        })?;
        let file: ModelFile = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad model config {}: {e}", path.display())))?;
        Self::new(file.model)
    }

    pub fn definition(&self) -> &ModelDefinition {
        &self.definition
    }

    fn pick_delay(&self) -> Duration {
        let DelayRange { min, max } = self.definition.delay_ms;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for StubModel {
    fn default() -> Self {
        Self {
            definition: ModelDefinition::default(),
        }
    }
}

#[async_trait]
impl ProcessingUnit for StubModel {
    type Input = StubInput;

    fn parse_and_validate(&self, raw: &[u8]) -> std::result::Result<StubInput, ValidationErrors> {
        let mut object = self.definition.schema.validate(raw)?;
        let name = match object.remove(&self.definition.greeting_field) {
            Some(serde_json::Value::String(name)) => name,
            // The schema guarantees a string here.
            _ => String::new(),
        };
        Ok(StubInput { name })
    }

    async fn process(&self, input: StubInput) -> anyhow::Result<Vec<String>> {
        let delay = self.pick_delay();
        debug!(model = %self.definition.name, delay_ms = delay.as_millis() as u64, "simulating processing");
        tokio::time::sleep(delay).await;
        Ok(vec![format!("hello, {}!", input.name)])
    }
}
