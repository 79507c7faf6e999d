use serde_json::{Map, Value};

use super::{ToolChoice, ToolDeclaration};
use crate::protocol::schema::{force_strict, prune_schema, SchemaDialect};

/// Collect legacy `functions` and modern `tools` into Messages tool
/// declarations, in that order.
#[must_use]
pub fn map_tools(body: &Map<String, Value>) -> Vec<ToolDeclaration> {
    let legacy = body
        .get("functions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|function| serde_json::json!({ "type": "function", "function": function }));
    let modern = body
        .get("tools")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .cloned();

    legacy
        .chain(modern)
        .filter_map(|entry| map_tool_entry(&entry))
        .collect()
}

fn map_tool_entry(entry: &Value) -> Option<ToolDeclaration> {
    let function = entry.get("function").filter(|f| f.is_object());
    let source = function.unwrap_or(entry);

    let Some(name) = source.get("name").and_then(Value::as_str) else {
        tracing::debug!("skipping tool declaration without a name");
        return None;
    };
    let description = source
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);
    let schema = source
        .get("input_schema")
        .or_else(|| source.get("parameters"))
        .filter(|schema| schema.is_object())
        .cloned()
        .unwrap_or_else(empty_object_schema);
    let strict = source
        .get("strict")
        .or_else(|| entry.get("strict"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut input_schema = prune_schema(&schema, SchemaDialect::Messages);
    if strict {
        force_strict(&mut input_schema);
    }

    Some(ToolDeclaration {
        name: name.to_string(),
        description,
        input_schema,
    })
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Resolve the tool-choice directive. `tool_choice` takes precedence over the
/// legacy `function_call`; no directive yields `None`.
#[must_use]
pub fn map_tool_choice(body: &Map<String, Value>) -> Option<ToolChoice> {
    body.get("tool_choice")
        .filter(|value| !value.is_null())
        .or_else(|| body.get("function_call"))
        .and_then(parse_tool_choice)
}

fn parse_tool_choice(value: &Value) -> Option<ToolChoice> {
    match value {
        Value::String(mode) => match mode.as_str() {
            "" => None,
            "none" => Some(ToolChoice::None),
            "required" | "any" => Some(ToolChoice::Any),
            _ => Some(ToolChoice::Auto),
        },
        Value::Object(obj) => {
            let nested = obj
                .get("function")
                .and_then(|function| function.get("name"))
                .and_then(Value::as_str);
            let bare = obj.get("name").and_then(Value::as_str);
            if let Some(name) = nested.or(bare) {
                return Some(ToolChoice::Tool {
                    name: name.to_string(),
                });
            }
            match obj.get("type").and_then(Value::as_str) {
                Some("auto") => Some(ToolChoice::Auto),
                Some("any") => Some(ToolChoice::Any),
                Some("none") => Some(ToolChoice::None),
                _ => None,
            }
        }
        _ => None,
    }
}
