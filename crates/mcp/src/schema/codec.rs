use super::{Schema, SchemaKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Client input that does not match a tool's input schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Location of the offending value, e.g. `notes[3].text`. Empty for the root.
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

/// A handler result that cannot be carried as wire text.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("success schema is not text")]
    NotText,

    #[error("expected {expected}, got {got}")]
    Mismatch {
        expected: &'static str,
        got: &'static str,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
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

fn child_field(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn mismatch(path: &str, expected: &str, value: &Value) -> ValidationError {
    ValidationError::new(
        path,
        format!("expected {}, got {}", expected, type_name(value)),
    )
}

fn validate_at(schema: &Schema, value: &Value, path: &str) -> Result<(), ValidationError> {
    match &schema.kind {
        SchemaKind::String { max_length } => {
            let Value::String(text) = value else {
                return Err(mismatch(path, "string", value));
            };
            if let Some(max) = max_length {
                if text.chars().count() > *max {
                    return Err(ValidationError::new(
                        path,
                        format!("exceeds maximum length {}", max),
                    ));
                }
            }
            Ok(())
        }
        SchemaKind::Integer => {
            if value.is_i64() || value.is_u64() {
                Ok(())
            } else {
                Err(mismatch(path, "integer", value))
            }
        }
        SchemaKind::Number => {
            if value.is_number() {
                Ok(())
            } else {
                Err(mismatch(path, "number", value))
            }
        }
        SchemaKind::Boolean => {
            if value.is_boolean() {
                Ok(())
            } else {
                Err(mismatch(path, "boolean", value))
            }
        }
        SchemaKind::Array { items, max_items } => {
            let Value::Array(elements) = value else {
                return Err(mismatch(path, "array", value));
            };
            if let Some(max) = max_items {
                if elements.len() > *max {
                    return Err(ValidationError::new(
                        path,
                        format!("expected at most {} items, got {}", max, elements.len()),
                    ));
                }
            }
            for (i, element) in elements.iter().enumerate() {
                validate_at(items, element, &format!("{}[{}]", path, i))?;
            }
            Ok(())
        }
        SchemaKind::Object { fields } => {
            let Value::Object(map) = value else {
                return Err(mismatch(path, "object", value));
            };
            for field in fields {
                let field_path = child_field(path, &field.name);
                match map.get(&field.name) {
                    None | Some(Value::Null) if field.optional => {}
                    None => return Err(ValidationError::new(&field_path, "is missing")),
                    Some(v) => validate_at(&field.schema, v, &field_path)?,
                }
            }
            Ok(())
        }
    }
}

/// Check `value` against `schema`, reporting the first violation found.
///
/// Properties not described by an object schema are ignored.
pub fn validate(schema: &Schema, value: &Value) -> Result<(), ValidationError> {
    validate_at(schema, value, "")
}

/// Validate `raw` against `schema`, then build the typed value.
pub fn decode<T: DeserializeOwned>(schema: &Schema, raw: &Value) -> Result<T, ValidationError> {
    validate(schema, raw)?;
    serde_json::from_value(raw.clone()).map_err(|e| ValidationError::new("", e.to_string()))
}

/// Turn a handler's success value into the text block sent on the wire.
pub fn encode<T: Serialize>(schema: &Schema, value: &T) -> Result<String, EncodingError> {
    if !schema.is_text() {
        return Err(EncodingError::NotText);
    }

    match serde_json::to_value(value)? {
        Value::String(text) => {
            validate(schema, &Value::String(text.clone()))?;
            Ok(text)
        }
        other => Err(EncodingError::Mismatch {
            expected: "string",
            got: type_name(&other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Note {
        text: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Input {
        notes: Vec<Note>,
        #[serde(default)]
        source: Option<String>,
    }

    fn schema() -> Schema {
        Schema::object(vec![
            Field::required(
                "notes",
                Schema::array(Schema::object(vec![Field::required(
                    "text",
                    Schema::string().max_length(5),
                )]))
                .max_items(2),
            ),
            Field::optional("source", Schema::string().max_length(10)),
        ])
    }

    #[test]
    fn test_decode_valid() {
        let input: Input = decode(&schema(), &json!({ "notes": [{ "text": "hi" }] })).unwrap();
        assert_eq!(
            input,
            Input {
                notes: vec![Note {
                    text: "hi".to_string()
                }],
                source: None,
            }
        );
    }

    #[test]
    fn test_optional_field_accepts_null() {
        let input: Input = decode(
            &schema(),
            &json!({ "notes": [], "source": null }),
        )
        .unwrap();
        assert!(input.source.is_none());
    }

    #[test]
    fn test_unknown_properties_are_ignored() {
        let input: Input = decode(
            &schema(),
            &json!({ "notes": [], "extra": true }),
        )
        .unwrap();
        assert!(input.notes.is_empty());
    }

    #[test]
    fn test_error_path_for_nested_string() {
        let err = validate(
            &schema(),
            &json!({ "notes": [{ "text": "ok" }, { "text": "too long" }] }),
        )
        .unwrap_err();

        assert_eq!(err.path, "notes[1].text");
        assert_eq!(err.to_string(), "notes[1].text: exceeds maximum length 5");
    }

    #[test]
    fn test_error_for_too_many_items() {
        let err = validate(
            &schema(),
            &json!({ "notes": [{ "text": "a" }, { "text": "b" }, { "text": "c" }] }),
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "notes: expected at most 2 items, got 3");
    }

    #[test]
    fn test_error_for_missing_field() {
        let err = validate(&schema(), &json!({})).unwrap_err();
        assert_eq!(err.to_string(), "notes: is missing");

        let err = validate(&schema(), &json!({ "notes": [{}] })).unwrap_err();
        assert_eq!(err.to_string(), "notes[0].text: is missing");
    }

    #[test]
    fn test_error_for_wrong_type() {
        let err = validate(&schema(), &json!({ "notes": "text" })).unwrap_err();
        assert_eq!(err.to_string(), "notes: expected array, got string");

        let err = validate(&schema(), &json!([1, 2])).unwrap_err();
        assert_eq!(err.to_string(), "expected object, got array");
    }

    #[test]
    fn test_length_counts_characters() {
        let input: Input = decode(&schema(), &json!({ "notes": [{ "text": "ééééé" }] })).unwrap();
        assert_eq!(input.notes[0].text, "ééééé");
    }

    #[test]
    fn test_numeric_kinds() {
        assert!(validate(&Schema::integer(), &json!(3)).is_ok());
        assert!(validate(&Schema::integer(), &json!(3.5)).is_err());
        assert!(validate(&Schema::number(), &json!(3.5)).is_ok());
        assert!(validate(&Schema::boolean(), &json!("true")).is_err());
    }

    #[test]
    fn test_encode_text() {
        assert_eq!(encode(&Schema::string(), &"done").unwrap(), "done");
    }

    #[test]
    fn test_encode_rejects_non_text_value() {
        let err = encode(&Schema::string(), &json!(42)).unwrap_err();
        assert!(matches!(
            err,
            EncodingError::Mismatch {
                expected: "string",
                got: "number"
            }
        ));
    }

    #[test]
    fn test_encode_rejects_non_text_schema() {
        let err = encode(&Schema::number(), &json!(42)).unwrap_err();
        assert!(matches!(err, EncodingError::NotText));
    }
}
