//! Payload schema: a flat JSON object with typed fields.
//!
//! Type checks are strict. An integer is not accepted where a string is
//! expected, and a string is never coerced into a number.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ValidationErrors, ValidationIssue};

/// Location used for issues about the payload as a whole.
const ROOT: &str = "__root__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<SchemaField>,
    /// Reject keys that are not declared fields.
    #[serde(default)]
    pub forbid_extra: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        }
    }

    fn mismatch(self) -> (&'static str, &'static str) {
        match self {
            FieldKind::String => ("str type expected", "type_error.str"),
            FieldKind::Integer => ("value is not a valid integer", "type_error.integer"),
            FieldKind::Number => ("value is not a valid float", "type_error.float"),
            FieldKind::Boolean => ("value is not a valid boolean", "type_error.bool"),
            FieldKind::Array => ("value is not a valid list", "type_error.list"),
            FieldKind::Object => ("value is not a valid dict", "type_error.dict"),
        }
    }
}

impl SchemaField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

impl Schema {
    pub fn new(name: impl Into<String>, fields: Vec<SchemaField>) -> Self {
        Self {
            name: name.into(),
            fields,
            forbid_extra: false,
        }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Parse `raw` as JSON and check it against the schema.
    ///
    /// Returns the payload object on success, with every issue collected
    /// otherwise (not just the first).
    pub fn validate(&self, raw: &[u8]) -> Result<Map<String, Value>, ValidationErrors> {
        let value: Value = serde_json::from_slice(raw).map_err(|e| {
            ValidationErrors::single(ValidationIssue::new(
                &[ROOT],
                format!("Invalid JSON: {e}"),
                "value_error.jsondecode",
            ))
        })?;

        let Value::Object(object) = value else {
            return Err(ValidationErrors::single(ValidationIssue::new(
                &[ROOT],
                "value is not a valid dict",
                "type_error.dict",
            )));
        };

        let mut issues = Vec::new();

        for field in &self.fields {
            match object.get(&field.name) {
                None => {
                    if field.required {
                        issues.push(ValidationIssue::new(
                            &[field.name.as_str()],
                            "field required",
                            "value_error.missing",
                        ));
                    }
                }
                Some(Value::Null) if !field.required => {}
                Some(Value::Null) => issues.push(ValidationIssue::new(
                    &[field.name.as_str()],
                    "none is not an allowed value",
                    "type_error.none.not_allowed",
                )),
                Some(value) if !field.kind.accepts(value) => {
                    let (msg, kind) = field.kind.mismatch();
                    issues.push(ValidationIssue::new(&[field.name.as_str()], msg, kind));
                }
                Some(_) => {}
            }
        }

        if self.forbid_extra {
            for key in object.keys() {
                if self.field(key).is_none() {
                    issues.push(ValidationIssue::new(
                        &[key.as_str()],
                        "extra fields not permitted",
                        "value_error.extra",
                    ));
                }
            }
        }

        if issues.is_empty() {
            Ok(object)
        } else {
            Err(ValidationErrors(issues))
        }
    }
}
