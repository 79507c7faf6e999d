use crate::protocol::anthropic::Usage;
use crate::protocol::canonical::CanonicalStreamEvent;
use crate::protocol::gemini::GeminiResponse;
use crate::protocol::mapping::gemini_finish_to_stop_reason;

/// Parse one `data:` payload from a Gemini stream.
///
/// # Errors
///
/// Returns the JSON error for malformed frames; callers log and skip them.
pub fn parse_gemini_frame(payload: &str) -> Result<GeminiResponse, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Decode a Gemini frame into canonical stream events.
///
/// Only the first candidate is read. Thought parts are dropped.
pub fn decode_gemini_frame_into(frame: &GeminiResponse, out: &mut Vec<CanonicalStreamEvent>) {
    let candidate = frame.candidates.as_ref().and_then(|c| c.first());

    if let Some(candidate) = candidate {
        for part in &candidate.content.parts {
            if part.is_thought() {
                continue;
            }
            if let Some(text) = &part.text {
                out.push(CanonicalStreamEvent::TextDelta(text.clone()));
            } else if let Some(call) = &part.function_call {
                out.push(CanonicalStreamEvent::ToolCall {
                    name: call.name.clone(),
                    args: call.args.clone(),
                    thought_signature: part.thought_signature.clone(),
                });
            }
        }
    }

    if let Some(usage) = &frame.usage_metadata {
        out.push(CanonicalStreamEvent::Usage(Usage {
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
        }));
    }

    if let Some(reason) = candidate.and_then(|c| c.finish_reason.as_deref()) {
        out.push(CanonicalStreamEvent::Finish {
            stop_reason: gemini_finish_to_stop_reason(reason),
            deferred: false,
        });
    }
}
