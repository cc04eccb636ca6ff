//! Structural descriptions of tool inputs and outputs.
//!
//! A [`Schema`] is written once per tool and drives both the JSON Schema
//! document advertised in `tools/list` and the validator applied to
//! `tools/call` arguments, so the two cannot drift apart.

mod codec;
pub mod naming;

pub use codec::{decode, encode, validate, EncodingError, ValidationError};

use serde_json::{json, Map, Value};

/// The shape of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    String { max_length: Option<usize> },
    Integer,
    Number,
    Boolean,
    Array {
        items: Box<Schema>,
        max_items: Option<usize>,
    },
    Object { fields: Vec<Field> },
}

/// A shape plus the annotations shown to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub kind: SchemaKind,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// A named property of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub optional: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            optional: true,
        }
    }
}

impl Schema {
    fn of(kind: SchemaKind) -> Self {
        Self {
            kind,
            title: None,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::of(SchemaKind::String { max_length: None })
    }

    pub fn integer() -> Self {
        Self::of(SchemaKind::Integer)
    }

    pub fn number() -> Self {
        Self::of(SchemaKind::Number)
    }

    pub fn boolean() -> Self {
        Self::of(SchemaKind::Boolean)
    }

    pub fn array(items: Schema) -> Self {
        Self::of(SchemaKind::Array {
            items: Box::new(items),
            max_items: None,
        })
    }

    pub fn object(fields: Vec<Field>) -> Self {
        Self::of(SchemaKind::Object { fields })
    }

    /// Limit a string schema to `max` characters. No effect on other kinds.
    pub fn max_length(mut self, max: usize) -> Self {
        if let SchemaKind::String { max_length } = &mut self.kind {
            *max_length = Some(max);
        }
        self
    }

    /// Limit an array schema to `max` items. No effect on other kinds.
    pub fn max_items(mut self, max: usize) -> Self {
        if let SchemaKind::Array { max_items, .. } = &mut self.kind {
            *max_items = Some(max);
        }
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// True for plain text, the only success shape the wire can carry.
    pub fn is_text(&self) -> bool {
        matches!(self.kind, SchemaKind::String { .. })
    }

    /// Render the JSON Schema document advertised to clients.
    pub fn to_json_schema(&self) -> Value {
        let mut doc = match &self.kind {
            SchemaKind::String { max_length } => {
                let mut doc = json!({ "type": "string" });
                if let Some(max) = max_length {
                    doc["maxLength"] = json!(max);
                }
                doc
            }
            SchemaKind::Integer => json!({ "type": "integer" }),
            SchemaKind::Number => json!({ "type": "number" }),
            SchemaKind::Boolean => json!({ "type": "boolean" }),
            SchemaKind::Array { items, max_items } => {
                let mut doc = json!({
                    "type": "array",
                    "items": items.to_json_schema(),
                });
                if let Some(max) = max_items {
                    doc["maxItems"] = json!(max);
                }
                doc
            }
            SchemaKind::Object { fields } => {
                let properties: Map<String, Value> = fields
                    .iter()
                    .map(|f| (f.name.clone(), f.schema.to_json_schema()))
                    .collect();
                let required: Vec<&str> = fields
                    .iter()
                    .filter(|f| !f.optional)
                    .map(|f| f.name.as_str())
                    .collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                })
            }
        };

        if let Some(title) = &self.title {
            doc["title"] = json!(title);
        }
        if let Some(description) = &self.description {
            doc["description"] = json!(description);
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_schema() -> Schema {
        Schema::object(vec![Field::required(
            "text",
            Schema::string().max_length(2000).title("Text"),
        )])
        .title("Note")
    }

    #[test]
    fn test_string_document() {
        let doc = Schema::string()
            .max_length(100)
            .title("Source")
            .description("Where the notes come from")
            .to_json_schema();

        assert_eq!(
            doc,
            json!({
                "type": "string",
                "maxLength": 100,
                "title": "Source",
                "description": "Where the notes come from"
            })
        );
    }

    #[test]
    fn test_object_document() {
        let schema = Schema::object(vec![
            Field::required("notes", Schema::array(note_schema()).max_items(50)),
            Field::optional("source", Schema::string()),
        ]);
        let doc = schema.to_json_schema();

        assert_eq!(doc["type"], "object");
        assert_eq!(doc["required"], json!(["notes"]));
        assert_eq!(doc["properties"]["notes"]["maxItems"], 50);
        assert_eq!(
            doc["properties"]["notes"]["items"]["properties"]["text"]["maxLength"],
            2000
        );
        assert_eq!(doc["properties"]["notes"]["items"]["title"], "Note");
        assert_eq!(doc["properties"]["source"]["type"], "string");
    }

    #[test]
    fn test_document_is_deterministic() {
        let schema = Schema::object(vec![
            Field::required("b", Schema::boolean()),
            Field::required("a", Schema::integer()),
        ]);
        assert_eq!(
            schema.to_json_schema().to_string(),
            schema.to_json_schema().to_string()
        );
    }

    #[test]
    fn test_constraints_only_apply_to_matching_kind() {
        assert_eq!(Schema::number().max_length(3), Schema::number());
        assert_eq!(Schema::string().max_items(3), Schema::string());
    }

    #[test]
    fn test_is_text() {
        assert!(Schema::string().is_text());
        assert!(Schema::string().max_length(10).is_text());
        assert!(!Schema::number().is_text());
        assert!(!Schema::object(vec![]).is_text());
    }
}
