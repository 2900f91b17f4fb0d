//! Declared response schemas and the decode step for structured outputs
//!
//! A [`ResponseSchema`] names the fields a model must return, their types and
//! cardinality bounds. It renders to JSON Schema for providers that can
//! constrain decoding, and it validates whatever comes back before the value is
//! handed to serde. Anything that does not fit is a violation; nothing is
//! coerced or truncated.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Shape of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Boolean,
    Integer,
    Number,
    /// A list of strings with optional inclusive length bounds
    TextList {
        min: Option<usize>,
        max: Option<usize>,
    },
    /// A list of nested records with optional inclusive length bounds
    RecordList {
        schema: Box<ResponseSchema>,
        min: Option<usize>,
        max: Option<usize>,
    },
}

/// One named field of a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// Named, typed description of a structured model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldSpec>,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
        }
    }

    /// Add a required field
    pub fn field(mut self, name: impl Into<String>, description: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            description: description.into(),
            kind,
            required: true,
        });
        self
    }

    /// Add a field that may be absent or null
    pub fn optional(mut self, name: impl Into<String>, description: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            description: description.into(),
            kind,
            required: false,
        });
        self
    }

    /// Render as a JSON Schema object
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let mut prop = kind_schema(&field.kind);
            if let Value::Object(obj) = &mut prop {
                obj.insert("description".to_string(), Value::String(field.description.clone()));
            }
            properties.insert(field.name.clone(), prop);
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }

        json!({
            "type": "object",
            "title": self.name,
            "description": self.description,
            "properties": properties,
            "required": required,
        })
    }

    /// Check a parsed value against this schema.
    ///
    /// Returns the path and reason of the first mismatch.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<(), String> {
        let obj = value
            .as_object()
            .ok_or_else(|| format!("{}: expected object, got {}", path, type_name(value)))?;

        for field in &self.fields {
            let field_path = format!("{}.{}", path, field.name);
            match obj.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(format!("{}: missing required field", field_path));
                }
                None | Some(Value::Null) => {}
                Some(v) => validate_kind(&field.kind, v, &field_path)?,
            }
        }
        Ok(())
    }
}

fn kind_schema(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::Text => json!({"type": "string"}),
        FieldKind::Boolean => json!({"type": "boolean"}),
        FieldKind::Integer => json!({"type": "integer"}),
        FieldKind::Number => json!({"type": "number"}),
        FieldKind::TextList { min, max } => {
            array_schema(json!({"type": "string"}), *min, *max)
        }
        FieldKind::RecordList { schema, min, max } => {
            array_schema(schema.to_json_schema(), *min, *max)
        }
    }
}

fn array_schema(items: Value, min: Option<usize>, max: Option<usize>) -> Value {
    let mut schema = json!({"type": "array", "items": items});
    if let Value::Object(obj) = &mut schema {
        if let Some(min) = min {
            obj.insert("minItems".to_string(), json!(min));
        }
        if let Some(max) = max {
            obj.insert("maxItems".to_string(), json!(max));
        }
    }
    schema
}

fn validate_kind(kind: &FieldKind, value: &Value, path: &str) -> Result<(), String> {
    let mismatch = |expected: &str| format!("{}: expected {}, got {}", path, expected, type_name(value));

    match kind {
        FieldKind::Text => value.is_string().then_some(()).ok_or_else(|| mismatch("string")),
        FieldKind::Boolean => value.is_boolean().then_some(()).ok_or_else(|| mismatch("boolean")),
        FieldKind::Integer => (value.is_i64() || value.is_u64())
            .then_some(())
            .ok_or_else(|| mismatch("integer")),
        FieldKind::Number => value.is_number().then_some(()).ok_or_else(|| mismatch("number")),
        FieldKind::TextList { min, max } => {
            let items = value.as_array().ok_or_else(|| mismatch("array"))?;
            check_len(items.len(), *min, *max, path)?;
            for (i, item) in items.iter().enumerate() {
                if !item.is_string() {
                    return Err(format!("{}[{}]: expected string, got {}", path, i, type_name(item)));
                }
            }
            Ok(())
        }
        FieldKind::RecordList { schema, min, max } => {
            let items = value.as_array().ok_or_else(|| mismatch("array"))?;
            check_len(items.len(), *min, *max, path)?;
            for (i, item) in items.iter().enumerate() {
                schema.validate_at(item, &format!("{}[{}]", path, i))?;
            }
            Ok(())
        }
    }
}

fn check_len(len: usize, min: Option<usize>, max: Option<usize>, path: &str) -> Result<(), String> {
    if let Some(min) = min {
        if len < min {
            return Err(format!("{}: {} items, at least {} required", path, len, min));
        }
    }
    if let Some(max) = max {
        if len > max {
            return Err(format!("{}: {} items, at most {} allowed", path, len, max));
        }
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A type a model can be asked to produce
pub trait StructuredOutput: DeserializeOwned + Send {
    fn response_schema() -> ResponseSchema;
}

/// Pull the JSON object out of a model reply.
///
/// Handles bare JSON, JSON inside markdown fences and JSON embedded in prose.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find('{') {
        let remainder = &trimmed[start..];
        if let Some(end) = find_matching_brace(remainder) {
            return &remainder[..end];
        }
    }

    trimmed
}

/// Byte offset just past the brace closing the first one, ignoring braces in strings
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse raw model text into a JSON value that satisfies `schema`
pub fn decode_value(raw: &str, schema: &ResponseSchema) -> Result<Value, String> {
    let candidate = extract_json(raw);
    let value: Value = serde_json::from_str(candidate)
        .map_err(|e| format!("response is not valid JSON: {}", e))?;
    schema.validate(&value)?;
    Ok(value)
}

/// Decode a schema-conforming value into its Rust type
pub fn decode<T: StructuredOutput>(value: Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("response does not match {}: {}", std::any::type_name::<T>(), e))
}
