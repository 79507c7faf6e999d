const ID_ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const ID_RANDOM_LEN: usize = 24;

fn random_id(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + ID_RANDOM_LEN);
    out.push_str(prefix);
    for _ in 0..ID_RANDOM_LEN {
        out.push(char::from(ID_ALPHABET[fastrand::usize(..ID_ALPHABET.len())]));
    }
    out
}

/// Fresh tool-use id, `toolu_` followed by random alphanumerics.
#[must_use]
pub fn next_tool_use_id() -> String {
    random_id("toolu_")
}

/// Fresh message id for a re-emitted response.
#[must_use]
pub fn next_message_id() -> String {
    random_id("msg_")
}

/// Strip trailing slashes so `{base}/path` joins cleanly.
#[must_use]
pub(crate) fn trim_base_url(base: &str) -> &str {
    base.trim_end_matches('/')
}
