//! Thought signatures embedded in tool-use ids.
//!
//! Gemini attaches an opaque `thoughtSignature` to function calls and expects
//! it back on the next turn. Messages clients only echo tool ids, so the
//! signature rides in the id as `<base>__ts_<urlencoded signature>`.

const MARKER: &str = "__ts_";

/// Split a tool id into its base and the URL-decoded signature, if any.
///
/// A suffix that does not decode to UTF-8 yields no signature.
#[must_use]
pub fn split_thought_signature(id: &str) -> (&str, Option<String>) {
    let Some(pos) = id.find(MARKER) else {
        return (id, None);
    };
    let (base, rest) = id.split_at(pos);
    let encoded = &rest[MARKER.len()..];
    if encoded.is_empty() {
        return (base, None);
    }
    match urlencoding::decode(encoded) {
        Ok(signature) => (base, Some(signature.into_owned())),
        Err(err) => {
            tracing::debug!("dropping undecodable thought signature: {err}");
            (base, None)
        }
    }
}

/// Append `signature` to `base` so it survives a client round trip.
#[must_use]
pub fn embed_thought_signature(base: &str, signature: &str) -> String {
    let encoded = urlencoding::encode(signature);
    let mut out = String::with_capacity(base.len() + MARKER.len() + encoded.len());
    out.push_str(base);
    out.push_str(MARKER);
    out.push_str(&encoded);
    out
}
