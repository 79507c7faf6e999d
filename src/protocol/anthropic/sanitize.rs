use serde_json::{Map, Value};

/// Request knobs with no Messages equivalent. Removed silently, reported back.
pub const DROPPED_KEYS: &[&str] = &[
    "n",
    "presence_penalty",
    "frequency_penalty",
    "best_of",
    "logit_bias",
    "seed",
    "stream_options",
    "logprobs",
    "top_logprobs",
    "user",
    "response_format",
    "service_tier",
    "parallel_tool_calls",
    "functions",
    "function_call",
    "developer",
    "strict",
    "reasoning_effort",
];

/// The Messages dialect rejects requests without `max_tokens`.
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Output of [`sanitize_request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub body: Map<String, Value>,
    pub dropped: Vec<String>,
}

/// Rewrite a raw request object into a shape the Messages dialect accepts.
///
/// Consumes the input and returns a new object together with the names of
/// the keys that were removed.
#[must_use]
pub fn sanitize_request(mut body: Map<String, Value>) -> Sanitized {
    if let Some(stop) = body.remove("stop") {
        let sequences = match stop {
            Value::Null => None,
            Value::Array(items) => Some(Value::Array(items)),
            scalar => Some(Value::Array(vec![scalar])),
        };
        if let Some(sequences) = sequences {
            body.entry("stop_sequences").or_insert(sequences);
        }
    }

    if let Some(user) = body.get("user").and_then(user_id_string) {
        let metadata = body
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        if let Value::Object(metadata) = metadata {
            metadata.insert("user_id".to_string(), Value::String(user));
        }
    }

    let mut dropped = Vec::new();
    for key in DROPPED_KEYS {
        if body.remove(*key).is_some() {
            dropped.push((*key).to_string());
        }
    }

    if matches!(body.get("max_tokens"), None | Some(Value::Null)) {
        body.insert("max_tokens".to_string(), Value::from(DEFAULT_MAX_TOKENS));
    }

    Sanitized { body, dropped }
}

fn user_id_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_drop_list_keys_are_removed_and_reported() {
        let input = object(json!({
            "model": "m",
            "messages": [],
            "n": 2,
            "seed": 7,
            "logit_bias": {"1": 2},
            "response_format": {"type": "json_object"},
            "reasoning_effort": "high",
            "temperature": 0.2
        }));
        let out = sanitize_request(input);
        for key in DROPPED_KEYS {
            assert!(!out.body.contains_key(*key), "{key} should be removed");
        }
        let mut dropped = out.dropped.clone();
        dropped.sort();
        assert_eq!(
            dropped,
            vec!["logit_bias", "n", "reasoning_effort", "response_format", "seed"]
        );
        assert_eq!(out.body["temperature"], json!(0.2));
    }

    #[test]
    fn test_nothing_dropped_reports_empty_list() {
        let out = sanitize_request(object(json!({"model": "m", "max_tokens": 10})));
        assert!(out.dropped.is_empty());
        assert_eq!(out.body["max_tokens"], json!(10));
    }

    #[test]
    fn test_scalar_stop_becomes_sequence() {
        let out = sanitize_request(object(json!({"stop": "x"})));
        assert_eq!(out.body["stop_sequences"], json!(["x"]));
        assert!(!out.body.contains_key("stop"));
    }

    #[test]
    fn test_array_stop_is_kept() {
        let out = sanitize_request(object(json!({"stop": ["a", "b"]})));
        assert_eq!(out.body["stop_sequences"], json!(["a", "b"]));
    }

    #[test]
    fn test_missing_or_null_max_tokens_defaults() {
        let out = sanitize_request(object(json!({"model": "m"})));
        assert_eq!(out.body["max_tokens"], json!(4096));
        let out = sanitize_request(object(json!({"max_tokens": null})));
        assert_eq!(out.body["max_tokens"], json!(4096));
    }

    #[test]
    fn test_user_moves_into_metadata() {
        let out = sanitize_request(object(json!({
            "user": "u-42",
            "metadata": {"trace": "t"}
        })));
        assert_eq!(out.body["metadata"]["user_id"], json!("u-42"));
        assert_eq!(out.body["metadata"]["trace"], json!("t"));
        assert!(!out.body.contains_key("user"));
        assert_eq!(out.dropped, vec!["user"]);
    }
}
