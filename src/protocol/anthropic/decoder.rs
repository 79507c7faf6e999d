use serde_json::{Map, Value};

use super::inbound::parse_turns;
use super::normalize::{extract_text, normalize_turns};
use super::sanitize::{sanitize_request, DEFAULT_MAX_TOKENS};
use super::tools::{map_tool_choice, map_tools};
use super::{MessagesRequest, RequestMetadata, ThinkingConfig};
use crate::error::ProxyError;

/// A canonical request plus the keys the sanitizer removed from it.
#[derive(Debug, Clone)]
pub struct DecodedRequest {
    pub request: MessagesRequest,
    pub dropped: Vec<String>,
}

/// Decode a raw inbound body into a canonical [`MessagesRequest`].
///
/// # Errors
///
/// Returns [`ProxyError::InvalidRequest`] when the body is not JSON, is not an
/// object, or lacks `model`/`messages`.
pub fn decode_inbound_request(body: &[u8]) -> Result<DecodedRequest, ProxyError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| ProxyError::InvalidRequest(format!("Invalid JSON body: {err}")))?;
    decode_inbound_value(value)
}

/// Decode an already-parsed inbound JSON value.
///
/// Tools are collected before sanitizing because the sanitizer removes the
/// legacy `functions`/`function_call` keys they may come from.
///
/// # Errors
///
/// See [`decode_inbound_request`].
pub fn decode_inbound_value(value: Value) -> Result<DecodedRequest, ProxyError> {
    let Value::Object(raw) = value else {
        return Err(ProxyError::InvalidRequest(
            "Request body must be a JSON object".into(),
        ));
    };

    let tools = map_tools(&raw);
    let tool_choice = map_tool_choice(&raw);
    let sanitized = sanitize_request(raw);
    let mut body = sanitized.body;

    let model = match body.remove("model") {
        Some(Value::String(model)) if !model.is_empty() => model,
        _ => return Err(ProxyError::InvalidRequest("`model` is required".into())),
    };
    let Some(Value::Array(messages)) = body.remove("messages") else {
        return Err(ProxyError::InvalidRequest(
            "`messages` must be an array".into(),
        ));
    };

    let top_level_system = body
        .remove("system")
        .map(|system| extract_text(&system))
        .filter(|system| !system.is_empty());
    let normalized = normalize_turns(parse_turns(&messages)?, top_level_system);

    let request = MessagesRequest {
        model,
        max_tokens: body
            .get("max_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_TOKENS),
        system: normalized.system,
        messages: normalized.turns,
        tools,
        tool_choice,
        temperature: body.get("temperature").and_then(Value::as_f64),
        top_p: body.get("top_p").and_then(Value::as_f64),
        top_k: body.get("top_k").and_then(Value::as_u64),
        stop_sequences: decode_stop_sequences(&body),
        thinking: decode_thinking(&body),
        metadata: decode_metadata(&body),
        stream: body.get("stream").and_then(Value::as_bool).unwrap_or(false),
    };

    Ok(DecodedRequest {
        request,
        dropped: sanitized.dropped,
    })
}

fn decode_stop_sequences(body: &Map<String, Value>) -> Option<Vec<String>> {
    let items = body.get("stop_sequences")?.as_array()?;
    let sequences: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    if sequences.is_empty() {
        None
    } else {
        Some(sequences)
    }
}

fn decode_thinking(body: &Map<String, Value>) -> Option<ThinkingConfig> {
    let thinking = body.get("thinking")?;
    if thinking.get("type").and_then(Value::as_str) == Some("disabled") {
        return None;
    }
    serde_json::from_value(thinking.clone()).ok()
}

fn decode_metadata(body: &Map<String, Value>) -> Option<RequestMetadata> {
    let user_id = body
        .get("metadata")?
        .get("user_id")
        .and_then(Value::as_str)?;
    Some(RequestMetadata {
        user_id: Some(user_id.to_string()),
    })
}
