use serde_json::{Map, Value};

use super::inbound::{InboundToolCall, InboundTurn};
use super::{ContentBlock, ImageSource, Role, Turn, TurnContent};
use crate::util::next_tool_use_id;

/// Turns in Messages shape plus the folded system prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTurns {
    pub system: Option<String>,
    pub turns: Vec<Turn>,
}

/// Rewrite classified turns into Messages turns.
///
/// `system` is the request's top-level system text, if any; it is the first
/// fragment of the resulting prompt.
#[must_use]
pub fn normalize_turns(inbound: Vec<InboundTurn>, system: Option<String>) -> NormalizedTurns {
    let mut system_fragments: Vec<String> = system.into_iter().filter(|s| !s.is_empty()).collect();
    let mut turns = Vec::with_capacity(inbound.len());

    for turn in inbound {
        match turn {
            InboundTurn::System { content } => {
                let text = extract_text(&content);
                if !text.is_empty() {
                    system_fragments.push(text);
                }
            }
            InboundTurn::ToolResult {
                tool_use_id,
                content,
            } => {
                let content = match content {
                    Value::Null => Value::String(String::new()),
                    other => other,
                };
                turns.push(Turn::user_blocks(vec![ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error: None,
                }]));
            }
            InboundTurn::AssistantFunctionCall { content, call } => {
                turns.push(assistant_with_calls(&content, vec![call]));
            }
            InboundTurn::AssistantToolCalls { content, calls } => {
                turns.push(assistant_with_calls(&content, calls));
            }
            InboundTurn::Passthrough { role, content } => {
                turns.push(Turn {
                    role,
                    content: passthrough_content(content),
                });
            }
        }
    }

    let system = if system_fragments.is_empty() {
        None
    } else {
        Some(system_fragments.join("\n\n"))
    };
    NormalizedTurns { system, turns }
}

fn assistant_with_calls(content: &Value, calls: Vec<InboundToolCall>) -> Turn {
    let mut blocks = Vec::with_capacity(calls.len() + 1);
    let text = extract_text(content);
    if !text.is_empty() {
        blocks.push(ContentBlock::Text { text });
    }
    for call in calls {
        blocks.push(ContentBlock::ToolUse {
            id: call.id.unwrap_or_else(next_tool_use_id),
            name: call.name,
            input: parse_arguments(call.arguments),
        });
    }
    Turn {
        role: Role::Assistant,
        content: TurnContent::Blocks(blocks),
    }
}

/// Decode chat-completions `arguments` into a JSON object.
///
/// Unparsable strings are kept under `raw` rather than discarded.
#[must_use]
pub fn parse_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(raw) => {
            if raw.trim().is_empty() {
                return Value::Object(Map::new());
            }
            match serde_json::from_str::<Value>(&raw) {
                Ok(value @ Value::Object(_)) => value,
                _ => serde_json::json!({ "raw": raw }),
            }
        }
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}

fn passthrough_content(content: Value) -> TurnContent {
    match content {
        Value::String(text) => TurnContent::Text(text),
        Value::Array(items) => TurnContent::Blocks(parse_content_blocks(&items)),
        Value::Null => TurnContent::Text(String::new()),
        other => TurnContent::Text(extract_text(&other)),
    }
}

/// Parse a block array leniently. Unknown block types are skipped.
#[must_use]
pub fn parse_content_blocks(items: &[Value]) -> Vec<ContentBlock> {
    let mut blocks = Vec::with_capacity(items.len());
    for item in items {
        if let Some(text) = item.as_str() {
            blocks.push(ContentBlock::text(text));
            continue;
        }
        match item.get("type").and_then(Value::as_str) {
            Some("image_url") => {
                if let Some(block) = image_url_block(item) {
                    blocks.push(block);
                }
            }
            _ => match serde_json::from_value::<ContentBlock>(item.clone()) {
                Ok(block) => blocks.push(block),
                Err(err) => {
                    tracing::debug!("skipping unsupported content block: {err}");
                }
            },
        }
    }
    blocks
}

fn image_url_block(item: &Value) -> Option<ContentBlock> {
    let url = item
        .get("image_url")
        .and_then(|image| image.get("url").or(Some(image)))
        .and_then(Value::as_str)?;
    if let Some((media_type, data)) = split_data_uri(url) {
        return Some(ContentBlock::Image {
            source: ImageSource {
                type_: "base64".to_string(),
                media_type: Some(media_type.to_string()),
                data: data.to_string(),
            },
        });
    }
    tracing::warn!("remote image URL cannot be inlined, forwarding as text reference");
    Some(ContentBlock::text(format!("[image: {url}]")))
}

fn split_data_uri(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64")?;
    Some((media_type, data))
}

/// Flatten message content into plain text. Never fails.
///
/// Strings are returned verbatim, arrays are flattened element-wise and
/// joined with newlines, objects yield their `text` or recurse into
/// `content`; anything else falls back to its JSON rendering.
#[must_use]
pub fn extract_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(extract_text)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(obj) => {
            if let Some(text) = obj.get("text").and_then(Value::as_str) {
                text.to_string()
            } else if let Some(content) = obj.get("content") {
                extract_text(content)
            } else {
                value.to_string()
            }
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::anthropic::inbound::parse_turns;
    use serde_json::json;

    #[test]
    fn test_system_and_developer_fold_into_one_prompt() {
        let inbound = parse_turns(&[
            json!({"role": "system", "content": "rule one"}),
            json!({"role": "user", "content": "hi"}),
            json!({"role": "developer", "content": [{"type": "text", "text": "rule two"}]}),
        ])
        .unwrap();
        let out = normalize_turns(inbound, Some("top".to_string()));
        assert_eq!(out.system.as_deref(), Some("top\n\nrule one\n\nrule two"));
        assert_eq!(out.turns.len(), 1);
        assert_eq!(out.turns[0].content, TurnContent::Text("hi".into()));
    }

    #[test]
    fn test_tool_turn_becomes_user_tool_result() {
        let inbound =
            parse_turns(&[json!({"role": "tool", "tool_call_id": "call_9", "content": "ok"})])
                .unwrap();
        let out = normalize_turns(inbound, None);
        assert!(out.system.is_none());
        assert_eq!(out.turns[0].role, Role::User);
        assert_eq!(
            out.turns[0].content,
            TurnContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: "call_9".into(),
                content: json!("ok"),
                is_error: None,
            }])
        );
    }

    #[test]
    fn test_tool_calls_keep_order_and_leading_text() {
        let inbound = parse_turns(&[json!({
            "role": "assistant",
            "content": "let me check",
            "tool_calls": [
                {"id": "c1", "function": {"name": "first", "arguments": "{\"a\":1}"}},
                {"id": "c2", "function": {"name": "second", "arguments": "not json"}}
            ]
        })])
        .unwrap();
        let out = normalize_turns(inbound, None);
        let TurnContent::Blocks(blocks) = &out.turns[0].content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], ContentBlock::text("let me check"));
        assert_eq!(
            blocks[1],
            ContentBlock::ToolUse {
                id: "c1".into(),
                name: "first".into(),
                input: json!({"a": 1}),
            }
        );
        assert_eq!(
            blocks[2],
            ContentBlock::ToolUse {
                id: "c2".into(),
                name: "second".into(),
                input: json!({"raw": "not json"}),
            }
        );
    }

    #[test]
    fn test_legacy_function_call_gets_synthesized_id() {
        let inbound = parse_turns(&[json!({
            "role": "assistant",
            "content": null,
            "function_call": {"name": "lookup", "arguments": "{}"}
        })])
        .unwrap();
        let out = normalize_turns(inbound, None);
        let TurnContent::Blocks(blocks) = &out.turns[0].content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            ContentBlock::ToolUse { id, name, .. } => {
                assert!(id.starts_with("toolu_"));
                assert!(id.len() > "toolu_".len());
                assert_eq!(name, "lookup");
            }
            other => panic!("expected tool_use, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_text_rules() {
        assert_eq!(extract_text(&json!("plain")), "plain");
        assert_eq!(
            extract_text(&json!([{"type": "text", "text": "a"}, {"text": "b"}])),
            "a\nb"
        );
        assert_eq!(extract_text(&json!({"content": [{"text": "deep"}]})), "deep");
        assert_eq!(extract_text(&json!({"other": 1})), "{\"other\":1}");
        assert_eq!(extract_text(&json!(3)), "3");
    }

    #[test]
    fn test_data_uri_image_becomes_image_block() {
        let blocks = parse_content_blocks(&[
            json!({"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AAAA"}}),
            json!({"type": "mystery"}),
        ]);
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            ContentBlock::Image { source } => {
                assert_eq!(source.media_type.as_deref(), Some("image/jpeg"));
                assert_eq!(source.data, "AAAA");
            }
            other => panic!("expected image, got {other:?}"),
        }
    }
}
