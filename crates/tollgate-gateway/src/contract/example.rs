//! Example payload generation for mocked responses.

use super::document::{ContractDocument, MediaTypeObject};
use serde_json::{Map, Value};

const MAX_DEPTH: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum ExampleError {
    #[error("unable to resolve schema reference '{0}'")]
    UnresolvedRef(String),
    #[error("media type has no examples and no schema")]
    NothingToRender,
}

/// Produces a response payload for a documented media type.
pub trait ExampleGenerator: Send + Sync {
    fn generate(
        &self,
        document: &ContractDocument,
        media: &MediaTypeObject,
        preferred: Option<&str>,
    ) -> Result<Value, ExampleError>;
}

/// Named example, then the first named example, then `example`, then a
/// skeleton derived from the schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaExampleGenerator;

impl ExampleGenerator for SchemaExampleGenerator {
    fn generate(
        &self,
        document: &ContractDocument,
        media: &MediaTypeObject,
        preferred: Option<&str>,
    ) -> Result<Value, ExampleError> {
        if let Some(value) = preferred
            .and_then(|name| media.examples.get(name))
            .and_then(|e| e.value.clone())
        {
            return Ok(value);
        }
        if let Some(example) = &media.example {
            return Ok(example.clone());
        }
        if let Some(value) = media.examples.values().find_map(|e| e.value.clone()) {
            return Ok(value);
        }
        match &media.schema {
            Some(schema) => skeleton(document, schema, 0),
            None => Err(ExampleError::NothingToRender),
        }
    }
}

fn skeleton(document: &ContractDocument, schema: &Value, depth: usize) -> Result<Value, ExampleError> {
    if depth > MAX_DEPTH {
        return Ok(Value::Null);
    }
    let schema = document.resolve_ref(schema).ok_or_else(|| {
        ExampleError::UnresolvedRef(
            schema
                .get("$ref")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        )
    })?;

    for key in ["example", "default"] {
        if let Some(v) = schema.get(key) {
            return Ok(v.clone());
        }
    }
    if let Some(first) = schema.get("enum").and_then(Value::as_array).and_then(|e| e.first()) {
        return Ok(first.clone());
    }
    if let Some(all) = schema.get("allOf").and_then(Value::as_array) {
        let mut merged = Map::new();
        for part in all {
            if let Value::Object(obj) = skeleton(document, part, depth + 1)? {
                merged.extend(obj);
            }
        }
        return Ok(Value::Object(merged));
    }
    for key in ["oneOf", "anyOf"] {
        if let Some(first) = schema.get(key).and_then(Value::as_array).and_then(|v| v.first()) {
            return skeleton(document, first, depth + 1);
        }
    }

    let kind = schema.get("type").and_then(Value::as_str).unwrap_or_else(|| {
        if schema.get("properties").is_some() {
            "object"
        } else if schema.get("items").is_some() {
            "array"
        } else {
            "string"
        }
    });

    Ok(match kind {
        "object" => {
            let mut obj = Map::new();
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (name, prop) in props {
                    obj.insert(name.clone(), skeleton(document, prop, depth + 1)?);
                }
            }
            Value::Object(obj)
        }
        "array" => match schema.get("items") {
            Some(items) => Value::Array(vec![skeleton(document, items, depth + 1)?]),
            None => Value::Array(Vec::new()),
        },
        "integer" => Value::from(schema.get("minimum").and_then(Value::as_i64).unwrap_or(1)),
        "number" => Value::from(schema.get("minimum").and_then(Value::as_f64).unwrap_or(1.5)),
        "boolean" => Value::Bool(true),
        "null" => Value::Null,
        _ => Value::String(string_for_format(
            schema.get("format").and_then(Value::as_str).unwrap_or_default(),
        )),
    })
}

fn string_for_format(format: &str) -> String {
    match format {
        "date-time" => "2024-01-01T00:00:00Z",
        "date" => "2024-01-01",
        "email" => "user@example.com",
        "uuid" => "3fa85f64-5717-4562-b3fc-2c963f66afa6",
        "uri" | "url" => "https://example.com",
        "ipv4" => "127.0.0.1",
        _ => "string",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::document::tests::petstore;
    use serde_json::json;

    fn media(doc: &ContractDocument, path: &str, code: &str) -> MediaTypeObject {
        doc.paths[path]
            .get
            .as_ref()
            .unwrap()
            .responses[code]
            .content
            .as_ref()
            .unwrap()["application/json"]
            .clone()
    }

    #[test]
    fn test_preferred_named_example() {
        let doc = petstore();
        let m = media(&doc, "/pets", "200");
        let value = SchemaExampleGenerator.generate(&doc, &m, Some("two")).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_falls_back_to_first_named_example() {
        let doc = petstore();
        let m = media(&doc, "/pets", "200");
        let value = SchemaExampleGenerator.generate(&doc, &m, Some("unknown")).unwrap();
        assert_eq!(value[0]["name"], "rex");
    }

    #[test]
    fn test_schema_skeleton_follows_refs() {
        let doc = petstore();
        let m = media(&doc, "/pets/{petId}", "200");
        let value = SchemaExampleGenerator.generate(&doc, &m, None).unwrap();
        assert_eq!(value, json!({"id": 1, "name": "fluffy", "tags": ["string"]}));
    }

    #[test]
    fn test_empty_media_is_error() {
        let doc = petstore();
        let err = SchemaExampleGenerator
            .generate(&doc, &MediaTypeObject::default(), None)
            .unwrap_err();
        assert!(matches!(err, ExampleError::NothingToRender));
    }

    #[test]
    fn test_unresolved_ref_is_error() {
        let doc = petstore();
        let m = MediaTypeObject {
            schema: Some(json!({"$ref": "#/components/schemas/Ghost"})),
            ..Default::default()
        };
        let err = SchemaExampleGenerator.generate(&doc, &m, None).unwrap_err();
        assert!(err.to_string().contains("Ghost"));
    }

    #[test]
    fn test_composition_and_formats() {
        let doc = petstore();
        let m = MediaTypeObject {
            schema: Some(json!({
                "allOf": [
                    {"$ref": "#/components/schemas/Pet"},
                    {"type": "object", "properties": {
                        "born": {"type": "string", "format": "date"},
                        "kind": {"enum": ["cat", "dog"]},
                        "owner": {"oneOf": [{"type": "string", "format": "email"}, {"type": "integer"}]}
                    }}
                ]
            })),
            ..Default::default()
        };
        let value = SchemaExampleGenerator.generate(&doc, &m, None).unwrap();
        assert_eq!(value["born"], "2024-01-01");
        assert_eq!(value["kind"], "cat");
        assert_eq!(value["owner"], "user@example.com");
        assert_eq!(value["name"], "fluffy");
    }
}
