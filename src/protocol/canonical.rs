use crate::protocol::anthropic::Usage;

/// Provider-neutral stream item decoded from one upstream frame.
///
/// Decoders push these in frame order: content first, then usage, then the
/// finish marker, so the session sees a frame's usage before it finalizes.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalStreamEvent {
    /// Visible text.
    TextDelta(String),
    /// A complete function call (Gemini emits calls whole).
    ToolCall {
        name: String,
        args: serde_json::Value,
        thought_signature: Option<String>,
    },
    /// A fragment of an incrementally streamed call, keyed by its ordinal.
    ToolCallDelta {
        ordinal: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// Latest usage snapshot; replaces any earlier one.
    Usage(Usage),
    /// Finish reason already mapped to a Messages stop reason (`None` = null).
    /// `deferred` finishes take effect at end of stream so trailing usage
    /// frames are still counted.
    Finish {
        stop_reason: Option<&'static str>,
        deferred: bool,
    },
}
