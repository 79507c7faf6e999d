pub mod reemit;
pub mod session;
pub mod sse;

use std::convert::Infallible;

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::protocol::anthropic::stream::encode_stream_event;
use crate::protocol::anthropic::StreamEvent;

/// Turn the driver's event channel into SSE-framed body chunks.
pub fn sse_body_stream(
    rx: mpsc::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    futures_util::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(encode_stream_event(&event)), rx))
    })
}
