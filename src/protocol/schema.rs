//! JSON-Schema pruning for tool parameter declarations.
//!
//! Each upstream dialect accepts a different subset of JSON Schema. Pruning
//! walks the whole schema tree (`properties`, `items`, nested objects and
//! arrays) and drops what the dialect rejects.

use serde_json::Value;

/// Which dialect a schema is being prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaDialect {
    /// Messages dialect: only `format: "uri"` is stripped.
    Messages,
    /// Gemini `functionDeclarations`: validation keywords are stripped.
    Gemini,
}

const GEMINI_UNSUPPORTED_KEYWORDS: &[&str] = &[
    "$schema",
    "additionalProperties",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "patternProperties",
    "dependencies",
    "const",
    "if",
    "then",
    "else",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
];

// Children of these keys are named sub-schemas; the names themselves are data.
const NAMED_SCHEMA_MAPS: &[&str] = &["properties", "$defs", "definitions"];

// Literal-valued keywords; their contents are instance data, not schema.
const LITERAL_KEYWORDS: &[&str] = &["enum", "default", "example", "examples", "required"];

/// Return a pruned copy of `schema` for `dialect`.
#[must_use]
pub fn prune_schema(schema: &Value, dialect: SchemaDialect) -> Value {
    let mut out = schema.clone();
    prune_schema_in_place(&mut out, dialect);
    out
}

/// Prune `schema` in place. Applying it twice is the same as applying it once.
pub fn prune_schema_in_place(schema: &mut Value, dialect: SchemaDialect) {
    match schema {
        Value::Object(map) => {
            match dialect {
                SchemaDialect::Messages => {
                    if map.get("format").and_then(Value::as_str) == Some("uri") {
                        map.remove("format");
                    }
                }
                SchemaDialect::Gemini => {
                    for keyword in GEMINI_UNSUPPORTED_KEYWORDS {
                        map.remove(*keyword);
                    }
                }
            }

            for (key, child) in map.iter_mut() {
                if LITERAL_KEYWORDS.contains(&key.as_str()) {
                    continue;
                }
                if NAMED_SCHEMA_MAPS.contains(&key.as_str()) {
                    if let Value::Object(named) = child {
                        for sub_schema in named.values_mut() {
                            prune_schema_in_place(sub_schema, dialect);
                        }
                    }
                    continue;
                }
                prune_schema_in_place(child, dialect);
            }
        }
        Value::Array(items) => {
            for item in items {
                prune_schema_in_place(item, dialect);
            }
        }
        _ => {}
    }
}

/// Force `additionalProperties: false` on an object schema root.
pub fn force_strict(schema: &mut Value) {
    if let Value::Object(map) = schema {
        map.insert("additionalProperties".to_string(), Value::Bool(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested_schema() -> Value {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "url": {"type": "string", "format": "uri"},
                "not": {"type": "string", "const": "x"},
                "tags": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "anyOf": [{"type": "string"}],
                        "properties": {
                            "weight": {"type": "number", "multipleOf": 0.5, "exclusiveMinimum": 0}
                        },
                        "patternProperties": {"^x": {"type": "string"}}
                    }
                }
            },
            "allOf": [{"if": {}, "then": {}, "else": {}}],
            "required": ["url"]
        })
    }

    #[test]
    fn test_gemini_prunes_every_level() {
        let pruned = prune_schema(&nested_schema(), SchemaDialect::Gemini);
        assert!(pruned.get("$schema").is_none());
        assert!(pruned.get("additionalProperties").is_none());
        assert!(pruned.get("allOf").is_none());
        let item = &pruned["properties"]["tags"]["items"];
        assert!(item.get("anyOf").is_none());
        assert!(item.get("patternProperties").is_none());
        let weight = &item["properties"]["weight"];
        assert!(weight.get("multipleOf").is_none());
        assert!(weight.get("exclusiveMinimum").is_none());
        assert_eq!(weight["type"], "number");
        assert_eq!(pruned["required"], json!(["url"]));
    }

    #[test]
    fn test_property_named_like_keyword_survives() {
        let pruned = prune_schema(&nested_schema(), SchemaDialect::Gemini);
        let not_prop = &pruned["properties"]["not"];
        assert_eq!(not_prop["type"], "string");
        assert!(not_prop.get("const").is_none());
    }

    #[test]
    fn test_gemini_pruning_is_idempotent() {
        let once = prune_schema(&nested_schema(), SchemaDialect::Gemini);
        let twice = prune_schema(&once, SchemaDialect::Gemini);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_messages_strips_only_uri_format() {
        let schema = json!({
            "type": "object",
            "properties": {
                "link": {"type": "string", "format": "uri"},
                "when": {"type": "string", "format": "date-time"},
                "list": {"type": "array", "items": {"type": "string", "format": "uri"}}
            },
            "additionalProperties": false
        });
        let pruned = prune_schema(&schema, SchemaDialect::Messages);
        assert!(pruned["properties"]["link"].get("format").is_none());
        assert!(pruned["properties"]["list"]["items"].get("format").is_none());
        assert_eq!(pruned["properties"]["when"]["format"], "date-time");
        assert_eq!(pruned["additionalProperties"], json!(false));
    }

    #[test]
    fn test_enum_values_are_left_alone() {
        let schema = json!({"type": "string", "enum": [{"const": 1}]});
        let pruned = prune_schema(&schema, SchemaDialect::Gemini);
        assert_eq!(pruned["enum"], json!([{"const": 1}]));
    }
}
