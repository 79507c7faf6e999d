use super::anthropic::Role;

// ---------------------------------------------------------------------------
// Role mappings
// ---------------------------------------------------------------------------

#[must_use]
pub fn role_to_gemini(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

#[must_use]
pub fn role_to_openai(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

// ---------------------------------------------------------------------------
// Stop reason mappings
// ---------------------------------------------------------------------------

pub const END_TURN: &str = "end_turn";
pub const MAX_TOKENS: &str = "max_tokens";
pub const TOOL_USE: &str = "tool_use";

/// Map a Gemini `finishReason`. Reasons without a Messages equivalent
/// (SAFETY, RECITATION, ...) map to `None` and are emitted as `null`.
#[must_use]
pub fn gemini_finish_to_stop_reason(reason: &str) -> Option<&'static str> {
    match reason {
        "STOP" => Some(END_TURN),
        "MAX_TOKENS" => Some(MAX_TOKENS),
        _ => None,
    }
}

#[must_use]
pub fn openai_finish_to_stop_reason(reason: &str) -> Option<&'static str> {
    match reason {
        "stop" => Some(END_TURN),
        "length" => Some(MAX_TOKENS),
        "tool_calls" | "function_call" => Some(TOOL_USE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        assert_eq!(role_to_gemini(Role::Assistant), "model");
        assert_eq!(role_to_gemini(Role::User), "user");
        assert_eq!(role_to_openai(Role::Assistant), "assistant");
    }

    #[test]
    fn test_gemini_finish_reasons() {
        assert_eq!(gemini_finish_to_stop_reason("STOP"), Some("end_turn"));
        assert_eq!(gemini_finish_to_stop_reason("MAX_TOKENS"), Some("max_tokens"));
        assert_eq!(gemini_finish_to_stop_reason("SAFETY"), None);
        assert_eq!(gemini_finish_to_stop_reason("OTHER"), None);
    }

    #[test]
    fn test_openai_finish_reasons() {
        assert_eq!(openai_finish_to_stop_reason("stop"), Some("end_turn"));
        assert_eq!(openai_finish_to_stop_reason("length"), Some("max_tokens"));
        assert_eq!(openai_finish_to_stop_reason("tool_calls"), Some("tool_use"));
        assert_eq!(openai_finish_to_stop_reason("content_filter"), None);
    }
}
