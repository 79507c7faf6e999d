use rustc_hash::FxHashMap;

use crate::error::ProxyError;
use crate::protocol::anthropic::{ContentBlock, Delta, MessagesResponse, StreamEvent, Usage};

/// Folds a re-emitted event sequence into one non-streaming response.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    // block index -> position in `content`
    positions: FxHashMap<usize, usize>,
    // block index -> tool input JSON received so far
    pending_json: FxHashMap<usize, String>,
    stop_reason: Option<String>,
    stop_sequence: Option<String>,
    usage: Usage,
    error: Option<String>,
}

impl ResponseAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.model = message.model;
                self.usage = message.usage;
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                self.positions.insert(index, self.content.len());
                self.content.push(content_block);
            }
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                Delta::TextDelta { text } => {
                    if let Some(ContentBlock::Text { text: buf }) = self.block_mut(index) {
                        buf.push_str(&text);
                    }
                }
                Delta::InputJsonDelta { partial_json } => {
                    self.pending_json
                        .entry(index)
                        .or_default()
                        .push_str(&partial_json);
                }
            },
            StreamEvent::ContentBlockStop { index } => {
                let Some(json) = self.pending_json.remove(&index) else {
                    return;
                };
                if let Some(ContentBlock::ToolUse { input, .. }) = self.block_mut(index) {
                    *input = serde_json::from_str(&json)
                        .unwrap_or_else(|_| serde_json::json!({ "raw": json }));
                }
            }
            StreamEvent::MessageDelta { delta, usage } => {
                self.stop_reason = delta.stop_reason;
                self.stop_sequence = delta.stop_sequence;
                self.usage = usage;
            }
            StreamEvent::Error { error } => self.error = Some(error.message),
            StreamEvent::MessageStop {} => {}
        }
    }

    fn block_mut(&mut self, index: usize) -> Option<&mut ContentBlock> {
        let pos = *self.positions.get(&index)?;
        self.content.get_mut(pos)
    }

    /// Finish folding.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Transport`] when the sequence carried an `error`
    /// event.
    pub fn finish(self) -> Result<MessagesResponse, ProxyError> {
        if let Some(message) = self.error {
            return Err(ProxyError::Transport(message));
        }
        Ok(MessagesResponse {
            id: self.id,
            type_: "message".to_string(),
            role: "assistant".to_string(),
            model: self.model,
            content: self.content,
            stop_reason: self.stop_reason,
            stop_sequence: self.stop_sequence,
            usage: self.usage,
        })
    }
}
