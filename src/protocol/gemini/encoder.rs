use crate::protocol::anthropic::{
    ContentBlock, MessagesRequest, ToolChoice, ToolDeclaration, Turn, TurnContent,
};
use crate::protocol::gemini::{
    GeminiContent, GeminiFunctionCall, GeminiFunctionCallingConfig, GeminiFunctionDeclaration,
    GeminiFunctionResponse, GeminiGenerationConfig, GeminiInlineData, GeminiPart, GeminiRequest,
    GeminiThinkingConfig, GeminiToolConfig, GeminiToolDeclaration,
};
use crate::protocol::mapping::role_to_gemini;
use crate::protocol::schema::{prune_schema, SchemaDialect};
use crate::protocol::thought_signature::split_thought_signature;

/// Upper bound Gemini 2.x accepts for `thinking_budget`.
pub const MAX_THINKING_BUDGET: u64 = 24_576;
/// Budgets at or above this select `thinking_level = "high"` on gemini-3.
pub const HIGH_THINKING_THRESHOLD: u64 = 16_000;

const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Encode a canonical request into a Gemini wire request.
///
/// `upstream_model` is the model the request is sent to; it selects the
/// thinking directive flavour.
#[must_use]
pub fn encode_gemini_request(request: &MessagesRequest, upstream_model: &str) -> GeminiRequest {
    let system_instruction = request.system.as_ref().map(|prompt| GeminiContent {
        role: None,
        parts: vec![GeminiPart::text(prompt.clone())],
    });

    let mut contents = Vec::with_capacity(request.messages.len());
    for turn in &request.messages {
        encode_turn_into(turn, &mut contents);
    }

    GeminiRequest {
        contents,
        tools: encode_tools(&request.tools),
        tool_config: request.tool_choice.as_ref().and_then(encode_tool_choice),
        system_instruction,
        generation_config: Some(encode_generation_config(request, upstream_model)),
    }
}

fn encode_turn_into(turn: &Turn, contents: &mut Vec<GeminiContent>) {
    let role = role_to_gemini(turn.role);
    let blocks = match &turn.content {
        TurnContent::Text(text) => {
            contents.push(GeminiContent {
                role: Some(role.to_string()),
                parts: vec![GeminiPart::text(text.clone())],
            });
            return;
        }
        TurnContent::Blocks(blocks) => blocks,
    };

    let mut parts = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block {
            ContentBlock::Text { text } => parts.push(GeminiPart::text(text.clone())),
            ContentBlock::Image { source } => parts.push(GeminiPart {
                inline_data: Some(GeminiInlineData {
                    mime_type: source
                        .media_type
                        .clone()
                        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string()),
                    data: source.data.clone(),
                }),
                ..GeminiPart::default()
            }),
            ContentBlock::ToolUse { id, name, input } => parts.push(GeminiPart {
                function_call: Some(GeminiFunctionCall {
                    name: name.clone(),
                    args: input.clone(),
                }),
                thought_signature: split_thought_signature(id).1,
                ..GeminiPart::default()
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                // Results travel in their own `function` turn; keep ordering by
                // flushing what this turn accumulated so far.
                if !parts.is_empty() {
                    contents.push(GeminiContent {
                        role: Some(role.to_string()),
                        parts: std::mem::take(&mut parts),
                    });
                }
                contents.push(function_response_turn(tool_use_id, content));
            }
            ContentBlock::Thinking { .. } => {}
        }
    }

    if !parts.is_empty() {
        contents.push(GeminiContent {
            role: Some(role.to_string()),
            parts,
        });
    }
}

fn function_response_turn(tool_use_id: &str, content: &serde_json::Value) -> GeminiContent {
    let content = match content {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    GeminiContent {
        role: Some("function".to_string()),
        parts: vec![GeminiPart {
            function_response: Some(GeminiFunctionResponse {
                name: tool_use_id.to_string(),
                response: serde_json::json!({ "content": content }),
            }),
            ..GeminiPart::default()
        }],
    }
}

fn encode_tools(tools: &[ToolDeclaration]) -> Option<Vec<GeminiToolDeclaration>> {
    if tools.is_empty() {
        return None;
    }
    let function_declarations = tools
        .iter()
        .map(|tool| GeminiFunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: gemini_parameters(&tool.input_schema),
        })
        .collect();
    Some(vec![GeminiToolDeclaration {
        function_declarations,
    }])
}

// Gemini rejects OBJECT schemas with no properties; omit those entirely.
fn gemini_parameters(schema: &serde_json::Value) -> Option<serde_json::Value> {
    let map = schema.as_object().filter(|map| !map.is_empty())?;
    let has_properties = map
        .get("properties")
        .and_then(serde_json::Value::as_object)
        .is_some_and(|props| !props.is_empty());
    let is_object = map.get("type").and_then(serde_json::Value::as_str) == Some("object");
    if is_object && !has_properties {
        return None;
    }
    Some(prune_schema(schema, SchemaDialect::Gemini))
}

fn encode_tool_choice(choice: &ToolChoice) -> Option<GeminiToolConfig> {
    let (mode, allowed) = match choice {
        ToolChoice::Auto => return None,
        ToolChoice::None => ("NONE", None),
        ToolChoice::Any => ("ANY", None),
        ToolChoice::Tool { name } => ("ANY", Some(vec![name.clone()])),
    };
    Some(GeminiToolConfig {
        function_calling_config: Some(GeminiFunctionCallingConfig {
            mode: Some(mode.to_string()),
            allowed_function_names: allowed,
        }),
    })
}

fn encode_generation_config(
    request: &MessagesRequest,
    upstream_model: &str,
) -> GeminiGenerationConfig {
    GeminiGenerationConfig {
        temperature: request.temperature,
        top_p: request.top_p,
        top_k: request.top_k,
        max_output_tokens: Some(request.max_tokens),
        stop_sequences: request.stop_sequences.clone(),
        thinking_config: request
            .thinking_budget()
            .map(|budget| thinking_config(upstream_model, budget)),
    }
}

/// Thinking directive for `model` given the client's token budget.
#[must_use]
pub fn thinking_config(model: &str, budget: u64) -> GeminiThinkingConfig {
    if model.contains("gemini-3") {
        let level = if budget >= HIGH_THINKING_THRESHOLD {
            "high"
        } else {
            "low"
        };
        GeminiThinkingConfig {
            thinking_budget: None,
            thinking_level: Some(level.to_string()),
        }
    } else {
        GeminiThinkingConfig {
            thinking_budget: Some(budget.min(MAX_THINKING_BUDGET)),
            thinking_level: None,
        }
    }
}
