use crate::protocol::anthropic::{ContentBlock, MessagesRequest, TurnContent, Usage};
use std::time::Duration;
use tracing::info;

/// Estimate the number of tokens in `text`.
///
/// Uses a lightweight heuristic (`bytes / 4`) to avoid loading model BPE tables.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Estimate the input tokens of a canonical request.
///
/// Sums the system prompt, text-bearing blocks of every turn and the
/// serialized tool definitions. Images are not counted.
#[must_use]
pub fn estimate_request_tokens(request: &MessagesRequest) -> u64 {
    let mut total: u64 = 0;

    if let Some(system) = &request.system {
        total += estimate_tokens(system);
    }

    for turn in &request.messages {
        match &turn.content {
            TurnContent::Text(text) => total += estimate_tokens(text),
            TurnContent::Blocks(blocks) => {
                for block in blocks {
                    total += estimate_block_tokens(block);
                }
            }
        }
    }

    for tool in &request.tools {
        total += estimate_tokens(&tool.name);
        if let Some(description) = &tool.description {
            total += estimate_tokens(description);
        }
        total += estimate_tokens(&tool.input_schema.to_string());
    }

    total
}

fn estimate_block_tokens(block: &ContentBlock) -> u64 {
    match block {
        ContentBlock::Text { text } => estimate_tokens(text),
        ContentBlock::Thinking { thinking, .. } => estimate_tokens(thinking),
        ContentBlock::ToolUse { name, input, .. } => {
            estimate_tokens(name) + estimate_tokens(&input.to_string())
        }
        ContentBlock::ToolResult { content, .. } => match content {
            serde_json::Value::String(text) => estimate_tokens(text),
            other => estimate_tokens(&other.to_string()),
        },
        ContentBlock::Image { .. } => 0,
    }
}

/// Log token usage for a completed request at INFO level.
pub fn log_request_usage(model: &str, upstream_model: &str, usage: &Usage, duration: Duration) {
    info!(
        model = model,
        upstream_model = upstream_model,
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        total_tokens = usage.input_tokens + usage.output_tokens,
        duration_seconds = duration.as_secs_f64(),
        "request completed"
    );
}
