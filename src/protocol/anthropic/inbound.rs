//! Boundary parse of inbound conversation turns.
//!
//! Clients send a mix of Messages-style turns and chat-completions leftovers
//! (system/developer turns, `tool` turns, `tool_calls`, legacy
//! `function_call`). Every turn is classified once here; later stages only
//! match on [`InboundTurn`].

use serde_json::Value;

use super::Role;
use crate::error::ProxyError;

/// One inbound turn, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundTurn {
    /// `system` or `developer` turn; folded into the system prompt.
    System { content: Value },
    /// `tool` or legacy `function` turn carrying a call result.
    ToolResult { tool_use_id: String, content: Value },
    /// Assistant turn with a legacy single `function_call`.
    AssistantFunctionCall {
        content: Value,
        call: InboundToolCall,
    },
    /// Assistant turn with one or more `tool_calls`.
    AssistantToolCalls {
        content: Value,
        calls: Vec<InboundToolCall>,
    },
    /// Already Messages-shaped; converted without reinterpretation.
    Passthrough { role: Role, content: Value },
}

/// A tool invocation as the client sent it. `arguments` is usually a JSON
/// string but some clients send an object.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

/// Classify every turn of a `messages` array.
///
/// # Errors
///
/// Returns [`ProxyError::InvalidRequest`] when a turn is not a JSON object.
pub fn parse_turns(messages: &[Value]) -> Result<Vec<InboundTurn>, ProxyError> {
    messages
        .iter()
        .enumerate()
        .map(|(idx, turn)| {
            parse_turn(turn).ok_or_else(|| {
                ProxyError::InvalidRequest(format!("messages[{idx}] must be an object"))
            })
        })
        .collect()
}

fn parse_turn(turn: &Value) -> Option<InboundTurn> {
    let obj = turn.as_object()?;
    let role = obj.get("role").and_then(Value::as_str).unwrap_or("user");
    let content = obj.get("content").cloned().unwrap_or(Value::Null);

    let parsed = match role {
        "system" | "developer" => InboundTurn::System { content },
        "tool" | "function" => {
            let tool_use_id = obj
                .get("tool_call_id")
                .and_then(Value::as_str)
                .or_else(|| obj.get("name").and_then(Value::as_str))
                .unwrap_or_default()
                .to_string();
            InboundTurn::ToolResult {
                tool_use_id,
                content,
            }
        }
        "assistant" => {
            let calls: Vec<InboundToolCall> = obj
                .get("tool_calls")
                .and_then(Value::as_array)
                .map(|calls| calls.iter().filter_map(parse_tool_call).collect())
                .unwrap_or_default();
            if !calls.is_empty() {
                InboundTurn::AssistantToolCalls { content, calls }
            } else if let Some(call) = obj.get("function_call").and_then(parse_function_call) {
                InboundTurn::AssistantFunctionCall { content, call }
            } else {
                InboundTurn::Passthrough {
                    role: Role::Assistant,
                    content,
                }
            }
        }
        _ => InboundTurn::Passthrough {
            role: Role::User,
            content,
        },
    };
    Some(parsed)
}

fn parse_tool_call(call: &Value) -> Option<InboundToolCall> {
    let function = call.get("function")?;
    let mut parsed = parse_function_call(function)?;
    parsed.id = call
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    Some(parsed)
}

fn parse_function_call(function: &Value) -> Option<InboundToolCall> {
    let name = function.get("name").and_then(Value::as_str)?;
    Some(InboundToolCall {
        id: None,
        name: name.to_string(),
        arguments: function.get("arguments").cloned().unwrap_or(Value::Null),
    })
}
