use crate::protocol::anthropic::Usage;
use crate::protocol::canonical::CanonicalStreamEvent;
use crate::protocol::mapping::openai_finish_to_stop_reason;
use crate::protocol::openai_chat::OpenAiStreamChunk;

/// Parse one `data:` payload from a Chat Completions stream.
///
/// # Errors
///
/// Returns the JSON error for malformed chunks; callers log and skip them.
pub fn parse_openai_chunk(payload: &str) -> Result<OpenAiStreamChunk, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Decode a chunk into canonical stream events.
///
/// The finish marker is deferred: with `include_usage` the usage arrives on a
/// later chunk with no choices.
pub fn decode_openai_chunk_into(chunk: &OpenAiStreamChunk, out: &mut Vec<CanonicalStreamEvent>) {
    let choice = chunk.choices.first();

    if let Some(choice) = choice {
        if let Some(text) = choice.delta.content.as_ref().filter(|t| !t.is_empty()) {
            out.push(CanonicalStreamEvent::TextDelta(text.clone()));
        }
        for call in choice.delta.tool_calls.iter().flatten() {
            let function = call.function.as_ref();
            out.push(CanonicalStreamEvent::ToolCallDelta {
                ordinal: call.index,
                id: call.id.clone(),
                name: function.and_then(|f| f.name.clone()),
                arguments: function
                    .and_then(|f| f.arguments.clone())
                    .unwrap_or_default(),
            });
        }
    }

    if let Some(usage) = chunk.usage {
        out.push(CanonicalStreamEvent::Usage(Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    if let Some(reason) = choice.and_then(|c| c.finish_reason.as_deref()) {
        out.push(CanonicalStreamEvent::Finish {
            stop_reason: openai_finish_to_stop_reason(reason),
            deferred: true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(payload: &str) -> Vec<CanonicalStreamEvent> {
        let chunk = parse_openai_chunk(payload).unwrap();
        let mut out = Vec::new();
        decode_openai_chunk_into(&chunk, &mut out);
        out
    }

    #[test]
    fn test_content_delta() {
        let events = decode(r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":"Hi"}}]}"#);
        assert_eq!(events, vec![CanonicalStreamEvent::TextDelta("Hi".into())]);
    }

    #[test]
    fn test_tool_call_fragments() {
        let events = decode(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[
                {"index":0,"id":"call_1","type":"function","function":{"name":"f","arguments":""}},
                {"index":1,"function":{"arguments":"{\"a\""}}
            ]}}]}"#,
        );
        assert_eq!(
            events,
            vec![
                CanonicalStreamEvent::ToolCallDelta {
                    ordinal: 0,
                    id: Some("call_1".into()),
                    name: Some("f".into()),
                    arguments: String::new(),
                },
                CanonicalStreamEvent::ToolCallDelta {
                    ordinal: 1,
                    id: None,
                    name: None,
                    arguments: "{\"a\"".into(),
                },
            ]
        );
    }

    #[test]
    fn test_finish_is_deferred_and_usage_only_chunk() {
        let events = decode(r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#);
        assert_eq!(
            events,
            vec![CanonicalStreamEvent::Finish {
                stop_reason: Some("tool_use"),
                deferred: true
            }]
        );
        let events = decode(
            r#"{"choices":[],"usage":{"prompt_tokens":7,"completion_tokens":3,"total_tokens":10}}"#,
        );
        assert_eq!(
            events,
            vec![CanonicalStreamEvent::Usage(Usage {
                input_tokens: 7,
                output_tokens: 3
            })]
        );
    }
}
