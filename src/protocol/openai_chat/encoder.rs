use serde_json::{json, Value};

use crate::protocol::anthropic::normalize::extract_text;
use crate::protocol::anthropic::{
    ContentBlock, MessagesRequest, Role, ToolChoice, ToolDeclaration, Turn, TurnContent,
};
use crate::protocol::mapping::role_to_openai;

use super::{
    OpenAiChatRequest, OpenAiMessage, OpenAiStreamOptions, OpenAiTool, OpenAiToolCall,
    OpenAiToolCallFunction, OpenAiToolChoice, OpenAiToolChoiceFunction,
    OpenAiToolChoiceFunctionCall, OpenAiToolFunction,
};

/// Encode a canonical request into a streaming Chat Completions request.
///
/// The upstream is always asked to stream with usage; non-streaming clients
/// get the folded result.
#[must_use]
pub fn encode_openai_chat_request(
    request: &MessagesRequest,
    upstream_model: &str,
) -> OpenAiChatRequest {
    let mut messages: Vec<OpenAiMessage> =
        Vec::with_capacity(request.messages.len() + usize::from(request.system.is_some()));

    if let Some(system) = &request.system {
        messages.push(OpenAiMessage::new("system", Some(Value::String(system.clone()))));
    }
    for turn in &request.messages {
        encode_turn_into(turn, &mut messages);
    }

    OpenAiChatRequest {
        model: upstream_model.to_string(),
        messages,
        tools: encode_tools(&request.tools),
        tool_choice: request.tool_choice.as_ref().map(encode_tool_choice),
        stream: true,
        stream_options: Some(OpenAiStreamOptions {
            include_usage: true,
        }),
        temperature: request.temperature,
        max_tokens: Some(request.max_tokens),
        top_p: request.top_p,
        stop: request.stop_sequences.clone(),
        user: request.metadata.as_ref().and_then(|m| m.user_id.clone()),
    }
}

fn encode_turn_into(turn: &Turn, out: &mut Vec<OpenAiMessage>) {
    let role = role_to_openai(turn.role);
    let blocks = match &turn.content {
        TurnContent::Text(text) => {
            out.push(OpenAiMessage::new(role, Some(Value::String(text.clone()))));
            return;
        }
        TurnContent::Blocks(blocks) => blocks,
    };

    match turn.role {
        Role::Assistant => out.push(encode_assistant_blocks(blocks)),
        Role::User => encode_user_blocks(blocks, out),
    }
}

fn encode_assistant_blocks(blocks: &[ContentBlock]) -> OpenAiMessage {
    let mut text = String::new();
    let mut calls = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::ToolUse { id, name, input } => calls.push(OpenAiToolCall {
                id: id.clone(),
                type_: "function".to_string(),
                function: OpenAiToolCallFunction {
                    name: name.clone(),
                    arguments: input.to_string(),
                },
            }),
            _ => {}
        }
    }
    let mut message = OpenAiMessage::new(
        "assistant",
        (!text.is_empty() || calls.is_empty()).then(|| Value::String(text)),
    );
    if !calls.is_empty() {
        message.tool_calls = Some(calls);
    }
    message
}

fn encode_user_blocks(blocks: &[ContentBlock], out: &mut Vec<OpenAiMessage>) {
    let mut parts: Vec<Value> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block {
            ContentBlock::Text { text } => parts.push(json!({ "type": "text", "text": text })),
            ContentBlock::Image { source } => {
                let media_type = source.media_type.as_deref().unwrap_or("image/png");
                parts.push(json!({
                    "type": "image_url",
                    "image_url": { "url": format!("data:{media_type};base64,{}", source.data) }
                }));
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                if !parts.is_empty() {
                    out.push(OpenAiMessage::new(
                        "user",
                        Some(Value::Array(std::mem::take(&mut parts))),
                    ));
                }
                let mut message = OpenAiMessage::new("tool", Some(Value::String(tool_text(content))));
                message.tool_call_id = Some(tool_use_id.clone());
                out.push(message);
            }
            ContentBlock::ToolUse { .. } | ContentBlock::Thinking { .. } => {}
        }
    }
    if !parts.is_empty() {
        out.push(OpenAiMessage::new("user", Some(Value::Array(parts))));
    }
}

fn tool_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(_) => extract_text(content),
        other => other.to_string(),
    }
}

fn encode_tools(tools: &[ToolDeclaration]) -> Option<Vec<OpenAiTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|tool| OpenAiTool {
                type_: "function".to_string(),
                function: OpenAiToolFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: Some(tool.input_schema.clone()),
                },
            })
            .collect(),
    )
}

fn encode_tool_choice(choice: &ToolChoice) -> OpenAiToolChoice {
    match choice {
        ToolChoice::None => OpenAiToolChoice::Mode("none".to_string()),
        ToolChoice::Any => OpenAiToolChoice::Mode("required".to_string()),
        ToolChoice::Auto => OpenAiToolChoice::Mode("auto".to_string()),
        ToolChoice::Tool { name } => OpenAiToolChoice::Function(OpenAiToolChoiceFunctionCall {
            type_: "function".to_string(),
            function: OpenAiToolChoiceFunction { name: name.clone() },
        }),
    }
}
