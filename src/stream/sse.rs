//! Line framing for upstream SSE bodies.
//!
//! Upstream bytes arrive in arbitrary chunks, possibly splitting a line or a
//! UTF-8 sequence. Complete lines are cut on `\n`; the tail is carried over
//! to the next chunk.
use bytes::{Buf, BytesMut};
use memchr::memchr_iter;

/// Classification of one complete SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// A `data:` payload (leading space stripped).
    Data(&'a str),
    /// Blank line, comment, `event:`/`id:`/`retry:` field or `[DONE]`.
    Ignored,
}

/// Classify one line, already stripped of its `\n` and any `\r`.
#[must_use]
pub fn classify_line(line: &str) -> SseLine<'_> {
    let Some(rest) = line.strip_prefix("data:") else {
        return SseLine::Ignored;
    };
    let payload = rest.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return SseLine::Ignored;
    }
    SseLine::Data(payload)
}

/// Incremental splitter yielding `data:` payloads.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    carry: BytesMut,
}

impl SseLineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and push the payload of every completed `data:` line.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        self.carry.extend_from_slice(chunk);
        let mut consumed = 0;
        for pos in memchr_iter(b'\n', &self.carry) {
            push_payload(&self.carry[consumed..pos], out);
            consumed = pos + 1;
        }
        self.carry.advance(consumed);
    }

    /// Flush a trailing line that never got its newline.
    pub fn finish_into(&mut self, out: &mut Vec<String>) {
        if !self.carry.is_empty() {
            let rest = self.carry.split();
            push_payload(&rest, out);
        }
    }
}

fn push_payload(raw: &[u8], out: &mut Vec<String>) {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if let SseLine::Data(payload) = classify_line(&line) {
        out.push(payload.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("data: {\"a\":1}"), SseLine::Data("{\"a\":1}"));
        assert_eq!(classify_line("data:{}"), SseLine::Data("{}"));
        assert_eq!(classify_line("data: [DONE]"), SseLine::Ignored);
        assert_eq!(classify_line(""), SseLine::Ignored);
        assert_eq!(classify_line(": keep-alive"), SseLine::Ignored);
        assert_eq!(classify_line("event: message"), SseLine::Ignored);
    }

    #[test]
    fn test_partial_lines_carry_over() {
        let mut buf = SseLineBuffer::new();
        let mut out = Vec::new();
        buf.feed_into(b"data: {\"te", &mut out);
        assert!(out.is_empty());
        buf.feed_into(b"xt\":1}\r\n\r\ndata: {}\n", &mut out);
        assert_eq!(out, vec!["{\"text\":1}".to_string(), "{}".to_string()]);
        buf.finish_into(&mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_split_utf8_sequence() {
        let line = "data: \"héllo\"\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut buf = SseLineBuffer::new();
        let mut out = Vec::new();
        buf.feed_into(&line[..split], &mut out);
        buf.feed_into(&line[split..], &mut out);
        assert_eq!(out, vec!["\"héllo\"".to_string()]);
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let mut buf = SseLineBuffer::new();
        let mut out = Vec::new();
        buf.feed_into(b"data: {\"x\":1}", &mut out);
        assert!(out.is_empty());
        buf.finish_into(&mut out);
        assert_eq!(out, vec!["{\"x\":1}".to_string()]);
    }
}
