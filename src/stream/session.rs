use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::protocol::anthropic::{
    ContentBlock, Delta, ErrorBody, MessageDeltaBody, MessageStart, StreamEvent, Usage,
};
use crate::protocol::canonical::CanonicalStreamEvent;
use crate::protocol::mapping::END_TURN;
use crate::protocol::thought_signature::embed_thought_signature;
use crate::util::{next_message_id, next_tool_use_id};

/// Lifecycle of one re-emitted response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingFirstChunk,
    Streaming,
    Finalizing,
    Closed,
    Errored,
}

/// A streamed tool call still being assembled, keyed by provider ordinal.
#[derive(Debug, Clone, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// A tool call already emitted to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedToolCall {
    pub id: String,
    pub name: String,
}

/// Re-emission state machine for one upstream response.
///
/// Synchronous: callers feed canonical events and collect the client events
/// to send. Every `*_into` method appends to `out` and never emits once the
/// consumer is gone.
#[derive(Debug)]
pub struct StreamSession {
    message_id: String,
    model: String,
    input_estimate: u64,
    state: SessionState,
    next_index: usize,
    open_text: Option<usize>,
    pending_calls: BTreeMap<usize, PendingToolCall>,
    emitted_calls: FxHashMap<usize, EmittedToolCall>,
    usage: Option<Usage>,
    text: String,
    deferred_stop: Option<Option<&'static str>>,
    finalized: bool,
    closed: bool,
}

impl StreamSession {
    /// `model` is echoed in `message_start`; `input_estimate` seeds its
    /// placeholder usage.
    #[must_use]
    pub fn new(model: impl Into<String>, input_estimate: u64) -> Self {
        Self {
            message_id: next_message_id(),
            model: model.into(),
            input_estimate,
            state: SessionState::AwaitingFirstChunk,
            next_index: 0,
            open_text: None,
            pending_calls: BTreeMap::new(),
            emitted_calls: FxHashMap::default(),
            usage: None,
            text: String::new(),
            deferred_stop: None,
            finalized: false,
            closed: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once the response was finalized or failed. A departed consumer
    /// does not end the session; the upstream is still read to completion.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.finalized || self.state == SessionState::Errored
    }

    /// The consumer is gone and emission is suppressed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Last usage reported upstream, zero when none arrived.
    #[must_use]
    pub fn usage(&self) -> Usage {
        self.usage.unwrap_or_default()
    }

    /// Concatenated visible text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Emitted tool calls keyed by block index.
    #[must_use]
    pub fn emitted_calls(&self) -> &FxHashMap<usize, EmittedToolCall> {
        &self.emitted_calls
    }

    /// The consumer dropped its end; later emissions become no-ops.
    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    fn emit(&self, out: &mut Vec<StreamEvent>, event: StreamEvent) {
        if !self.closed {
            out.push(event);
        }
    }

    fn take_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// Emit `message_start`.
    pub fn start_into(&mut self, out: &mut Vec<StreamEvent>) {
        let event = StreamEvent::MessageStart {
            message: MessageStart {
                id: self.message_id.clone(),
                type_: "message".to_string(),
                role: "assistant".to_string(),
                model: self.model.clone(),
                content: Vec::new(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage {
                    input_tokens: self.input_estimate,
                    output_tokens: 1,
                },
            },
        };
        self.emit(out, event);
    }

    /// Apply one decoded upstream event.
    pub fn apply_into(&mut self, event: CanonicalStreamEvent, out: &mut Vec<StreamEvent>) {
        if self.is_done() {
            return;
        }
        if self.state == SessionState::AwaitingFirstChunk {
            self.state = SessionState::Streaming;
        }
        match event {
            CanonicalStreamEvent::TextDelta(text) => self.text_into(text, out),
            CanonicalStreamEvent::ToolCall {
                name,
                args,
                thought_signature,
            } => self.tool_call_into(name, &args, thought_signature.as_deref(), out),
            CanonicalStreamEvent::ToolCallDelta {
                ordinal,
                id,
                name,
                arguments,
            } => {
                let pending = self.pending_calls.entry(ordinal).or_default();
                if pending.id.is_none() {
                    pending.id = id;
                }
                if pending.name.is_none() {
                    pending.name = name;
                }
                pending.arguments.push_str(&arguments);
            }
            CanonicalStreamEvent::Usage(usage) => self.usage = Some(usage),
            CanonicalStreamEvent::Finish {
                stop_reason,
                deferred,
            } => {
                if deferred {
                    self.deferred_stop.get_or_insert(stop_reason);
                } else {
                    self.finalize_into(stop_reason, out);
                }
            }
        }
    }

    fn text_into(&mut self, text: String, out: &mut Vec<StreamEvent>) {
        if text.is_empty() {
            return;
        }
        let index = match self.open_text {
            Some(index) => index,
            None => {
                let index = self.take_index();
                self.open_text = Some(index);
                self.emit(
                    out,
                    StreamEvent::ContentBlockStart {
                        index,
                        content_block: ContentBlock::text(""),
                    },
                );
                index
            }
        };
        self.text.push_str(&text);
        self.emit(
            out,
            StreamEvent::ContentBlockDelta {
                index,
                delta: Delta::TextDelta { text },
            },
        );
    }

    fn close_text_into(&mut self, out: &mut Vec<StreamEvent>) {
        if let Some(index) = self.open_text.take() {
            self.emit(out, StreamEvent::ContentBlockStop { index });
        }
    }

    fn tool_call_into(
        &mut self,
        name: String,
        args: &serde_json::Value,
        thought_signature: Option<&str>,
        out: &mut Vec<StreamEvent>,
    ) {
        let id = match thought_signature {
            Some(signature) => embed_thought_signature(&next_tool_use_id(), signature),
            None => next_tool_use_id(),
        };
        let args = if args.is_null() {
            "{}".to_string()
        } else {
            args.to_string()
        };
        self.emit_tool_block(id, name, &args, out);
    }

    fn emit_tool_block(
        &mut self,
        id: String,
        name: String,
        arguments: &str,
        out: &mut Vec<StreamEvent>,
    ) {
        self.close_text_into(out);
        let index = self.take_index();
        self.emit(
            out,
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: serde_json::json!({}),
                },
            },
        );
        if !arguments.is_empty() {
            self.emit(
                out,
                StreamEvent::ContentBlockDelta {
                    index,
                    delta: Delta::InputJsonDelta {
                        partial_json: arguments.to_string(),
                    },
                },
            );
        }
        self.emit(out, StreamEvent::ContentBlockStop { index });
        self.emitted_calls
            .insert(index, EmittedToolCall { id, name });
    }

    fn finalize_into(&mut self, stop_reason: Option<&'static str>, out: &mut Vec<StreamEvent>) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        self.state = SessionState::Finalizing;

        self.close_text_into(out);
        for (_, call) in std::mem::take(&mut self.pending_calls) {
            let id = call.id.unwrap_or_else(next_tool_use_id);
            self.emit_tool_block(id, call.name.unwrap_or_default(), &call.arguments, out);
        }

        self.emit(
            out,
            StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: stop_reason.map(str::to_string),
                    stop_sequence: None,
                },
                usage: self.usage(),
            },
        );
        self.emit(out, StreamEvent::MessageStop {});
        self.state = SessionState::Closed;
    }

    /// Upstream body ended. Finalizes with the deferred reason or `end_turn`.
    pub fn finish_into(&mut self, out: &mut Vec<StreamEvent>) {
        if self.is_done() {
            return;
        }
        let stop_reason = self.deferred_stop.unwrap_or(Some(END_TURN));
        self.finalize_into(stop_reason, out);
    }

    /// Reading upstream failed. Emits one `error` event unless already done.
    pub fn fail_into(&mut self, message: &str, out: &mut Vec<StreamEvent>) {
        if self.is_done() {
            return;
        }
        self.emit(
            out,
            StreamEvent::Error {
                error: ErrorBody {
                    type_: "api_error".to_string(),
                    message: message.to_string(),
                },
            },
        );
        self.state = SessionState::Errored;
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::gemini::stream::{decode_gemini_frame_into, parse_gemini_frame};
    use crate::protocol::openai_chat::stream::{decode_openai_chunk_into, parse_openai_chunk};
    use crate::protocol::thought_signature::split_thought_signature;

    fn run_gemini(frames: &[&str]) -> (StreamSession, Vec<StreamEvent>) {
        let mut session = StreamSession::new("claude-test", 3);
        let mut out = Vec::new();
        session.start_into(&mut out);
        let mut canon = Vec::new();
        for frame in frames {
            decode_gemini_frame_into(&parse_gemini_frame(frame).unwrap(), &mut canon);
            for event in canon.drain(..) {
                session.apply_into(event, &mut out);
            }
        }
        session.finish_into(&mut out);
        (session, out)
    }

    fn names(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::name).collect()
    }

    #[test]
    fn test_two_text_frames_exact_sequence() {
        let (session, out) = run_gemini(&[
            r#"{"candidates":[{"content":{"parts":[{"text":"Hi"}]}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":" there"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":10,"candidatesTokenCount":2}}"#,
        ]);
        assert_eq!(out.len(), 7);
        match &out[0] {
            StreamEvent::MessageStart { message } => {
                assert!(message.id.starts_with("msg_"));
                assert!(message.content.is_empty());
                assert_eq!(message.usage, Usage { input_tokens: 3, output_tokens: 1 });
            }
            other => panic!("expected message_start, got {other:?}"),
        }
        assert_eq!(
            out[1],
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlock::text("")
            }
        );
        assert_eq!(
            out[2],
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: Delta::TextDelta { text: "Hi".into() }
            }
        );
        assert_eq!(
            out[3],
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: Delta::TextDelta {
                    text: " there".into()
                }
            }
        );
        assert_eq!(out[4], StreamEvent::ContentBlockStop { index: 0 });
        assert_eq!(
            out[5],
            StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: Some("end_turn".into()),
                    stop_sequence: None
                },
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 2
                }
            }
        );
        assert_eq!(out[6], StreamEvent::MessageStop {});
        assert_eq!(session.text(), "Hi there");
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_function_call_is_a_self_closing_block() {
        let (session, out) = run_gemini(&[
            r#"{"candidates":[{"content":{"parts":[{"text":"Let me look"}]}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"f","args":{"a":1}},"thoughtSignature":"c2ln+/="}]},"finishReason":"STOP"}]}"#,
        ]);
        assert_eq!(
            names(&out),
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(out[3], StreamEvent::ContentBlockStop { index: 0 });
        let StreamEvent::ContentBlockStart {
            index: 1,
            content_block: ContentBlock::ToolUse { id, name, input },
        } = &out[4]
        else {
            panic!("expected tool_use start at index 1, got {:?}", out[4]);
        };
        assert_eq!(name, "f");
        assert_eq!(input, &serde_json::json!({}));
        assert_eq!(split_thought_signature(id).1.as_deref(), Some("c2ln+/="));
        assert_eq!(
            out[5],
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: Delta::InputJsonDelta {
                    partial_json: "{\"a\":1}".into()
                }
            }
        );
        assert_eq!(out[6], StreamEvent::ContentBlockStop { index: 1 });
        assert_eq!(session.emitted_calls().get(&1).map(|c| c.name.as_str()), Some("f"));
        // No usage seen: zero fallback.
        let StreamEvent::MessageDelta { usage, .. } = &out[7] else {
            panic!("expected message_delta");
        };
        assert_eq!(*usage, Usage::default());
    }

    #[test]
    fn test_indices_strictly_increase() {
        let (_, out) = run_gemini(&[
            r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"functionCall":{"name":"x","args":{}}},{"text":"b"},{"functionCall":{"name":"y","args":{}}}]}}]}"#,
        ]);
        let starts: Vec<usize> = out
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentBlockStart { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_frames_after_finalization_are_ignored() {
        let (_, out) = run_gemini(&[
            r#"{"candidates":[{"content":{"parts":[{"text":"done"}]},"finishReason":"MAX_TOKENS"}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"late"}]},"finishReason":"STOP"}]}"#,
        ]);
        assert_eq!(
            out.iter().filter(|e| matches!(e, StreamEvent::MessageDelta { .. })).count(),
            1
        );
        assert_eq!(
            out.iter().filter(|e| matches!(e, StreamEvent::MessageStop {})).count(),
            1
        );
        assert_eq!(out.last(), Some(&StreamEvent::MessageStop {}));
        let StreamEvent::MessageDelta { delta, .. } = &out[out.len() - 2] else {
            panic!("expected message_delta");
        };
        assert_eq!(delta.stop_reason.as_deref(), Some("max_tokens"));
    }

    #[test]
    fn test_end_of_stream_without_finish_reason() {
        let (_, out) = run_gemini(&[r#"{"candidates":[{"content":{"parts":[{"text":"x"}]}}]}"#]);
        let StreamEvent::MessageDelta { delta, .. } = &out[out.len() - 2] else {
            panic!("expected message_delta");
        };
        assert_eq!(delta.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(out.last(), Some(&StreamEvent::MessageStop {}));
    }

    #[test]
    fn test_unmapped_finish_reason_is_null() {
        let (_, out) = run_gemini(&[r#"{"candidates":[{"finishReason":"SAFETY"}]}"#]);
        assert_eq!(names(&out), vec!["message_start", "message_delta", "message_stop"]);
        let StreamEvent::MessageDelta { delta, .. } = &out[1] else {
            panic!("expected message_delta");
        };
        assert_eq!(delta.stop_reason, None);
    }

    #[test]
    fn test_openai_tool_calls_accumulate_until_finalization() {
        let mut session = StreamSession::new("claude-test", 0);
        let mut out = Vec::new();
        session.start_into(&mut out);
        let mut canon = Vec::new();
        for chunk in [
            r#"{"choices":[{"index":0,"delta":{"content":"ok"}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"second","arguments":"{}"}}]}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"first","arguments":"{\"q\":"}}]}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"x\"}"}}]}}]}"#,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":4,"total_tokens":16}}"#,
        ] {
            decode_openai_chunk_into(&parse_openai_chunk(chunk).unwrap(), &mut canon);
            for event in canon.drain(..) {
                session.apply_into(event, &mut out);
            }
        }
        assert!(!session.is_finalized());
        session.finish_into(&mut out);

        let tool_starts: Vec<(usize, String)> = out
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentBlockStart {
                    index,
                    content_block: ContentBlock::ToolUse { id, .. },
                } => Some((*index, id.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            tool_starts,
            vec![(1, "call_a".to_string()), (2, "call_b".to_string())]
        );
        assert!(out.contains(&StreamEvent::ContentBlockDelta {
            index: 1,
            delta: Delta::InputJsonDelta {
                partial_json: "{\"q\":\"x\"}".into()
            }
        }));
        assert_eq!(
            out[out.len() - 2],
            StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: Some("tool_use".into()),
                    stop_sequence: None
                },
                usage: Usage {
                    input_tokens: 12,
                    output_tokens: 4
                }
            }
        );
    }

    #[test]
    fn test_failure_emits_error_without_message_stop() {
        let mut session = StreamSession::new("m", 0);
        let mut out = Vec::new();
        session.start_into(&mut out);
        session.apply_into(CanonicalStreamEvent::TextDelta("partial".into()), &mut out);
        session.fail_into("connection reset", &mut out);
        session.finish_into(&mut out);
        session.fail_into("again", &mut out);
        assert_eq!(
            names(&out),
            vec!["message_start", "content_block_start", "content_block_delta", "error"]
        );
        assert_eq!(session.state(), SessionState::Errored);
    }

    #[test]
    fn test_closed_consumer_still_finalizes_silently() {
        let mut session = StreamSession::new("m", 0);
        let mut out = Vec::new();
        session.start_into(&mut out);
        session.mark_closed();
        assert!(!session.is_done());
        session.apply_into(CanonicalStreamEvent::TextDelta("x".into()), &mut out);
        session.apply_into(
            CanonicalStreamEvent::Usage(Usage {
                input_tokens: 7,
                output_tokens: 3,
            }),
            &mut out,
        );
        session.finish_into(&mut out);
        session.fail_into("late", &mut out);
        assert_eq!(names(&out), vec!["message_start"]);
        assert!(session.is_closed());
        assert!(session.is_finalized());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.text(), "x");
        assert_eq!(
            session.usage(),
            Usage {
                input_tokens: 7,
                output_tokens: 3
            }
        );
    }
}
