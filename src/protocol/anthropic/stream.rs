use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::anthropic::StreamEvent;

/// Frame one event as `event: <name>\ndata: <json>\n\n`.
#[must_use]
pub fn encode_stream_event(event: &StreamEvent) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);
    encode_stream_event_into(event, &mut buf);
    buf.freeze()
}

/// Frame one event into a caller-provided buffer.
pub fn encode_stream_event_into(event: &StreamEvent, buf: &mut BytesMut) {
    buf.put_slice(b"event: ");
    buf.put_slice(event.name().as_bytes());
    buf.put_slice(b"\ndata: ");
    // Serializing these types cannot fail: no non-string map keys, no NaN.
    match serde_json::to_vec(event) {
        Ok(json) => buf.put_slice(&json),
        Err(err) => {
            tracing::error!("failed to serialize stream event: {err}");
            buf.put_slice(b"{}");
        }
    }
    buf.put_slice(b"\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::anthropic::{Delta, MessageDeltaBody, Usage};

    #[test]
    fn test_text_delta_framing() {
        let bytes = encode_stream_event(&StreamEvent::ContentBlockDelta {
            index: 0,
            delta: Delta::TextDelta { text: "Hi".into() },
        });
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n"
        );
    }

    #[test]
    fn test_message_delta_keeps_null_stop_reason() {
        let bytes = encode_stream_event(&StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: None,
                stop_sequence: None,
            },
            usage: Usage::default(),
        });
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with("event: message_delta\n"));
        assert!(text.contains("\"stop_reason\":null"));
    }

    #[test]
    fn test_message_stop_framing() {
        let bytes = encode_stream_event(&StreamEvent::MessageStop {});
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n"
        );
    }
}
