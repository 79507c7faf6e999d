use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::config::UpstreamProvider;
use crate::observability::token_counter::log_request_usage;
use crate::observability::usage::UsageLedger;
use crate::protocol::anthropic::StreamEvent;
use crate::protocol::canonical::CanonicalStreamEvent;
use crate::protocol::gemini::stream::{decode_gemini_frame_into, parse_gemini_frame};
use crate::protocol::openai_chat::stream::{decode_openai_chunk_into, parse_openai_chunk};

use super::session::StreamSession;
use super::sse::SseLineBuffer;

/// Bounded so a slow client applies backpressure to the upstream read.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Everything one stream driver needs besides the upstream body.
#[derive(Debug, Clone)]
pub struct ReemitContext {
    pub provider: UpstreamProvider,
    /// Model name echoed to the client.
    pub model: String,
    pub upstream_model: String,
    pub input_estimate: u64,
    pub ledger: Arc<UsageLedger>,
    pub started: Instant,
}

/// Spawn the driver task and return the receiving end of its events.
///
/// The task ends when the upstream body ends or a read fails. A dropped
/// receiver only silences emission: the body is still read so the finished
/// response's usage reaches the ledger.
pub fn spawn_reemit<S, E>(body: S, ctx: ReemitContext) -> mpsc::Receiver<StreamEvent>
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(drive(body, ctx, tx));
    rx
}

/// Decode one `data:` payload into canonical events. Malformed frames are
/// logged and skipped.
fn decode_payload(provider: UpstreamProvider, payload: &str, out: &mut Vec<CanonicalStreamEvent>) {
    let result = match provider {
        UpstreamProvider::Gemini => {
            parse_gemini_frame(payload).map(|frame| decode_gemini_frame_into(&frame, out))
        }
        UpstreamProvider::Openai => {
            parse_openai_chunk(payload).map(|chunk| decode_openai_chunk_into(&chunk, out))
        }
    };
    if let Err(err) = result {
        tracing::warn!(provider = %provider, "skipping malformed upstream frame: {err}");
    }
}

/// Send queued events in order. A closed receiver marks the session closed
/// and discards the rest; later events are never queued.
async fn flush(
    tx: &mpsc::Sender<StreamEvent>,
    session: &mut StreamSession,
    events: &mut Vec<StreamEvent>,
) {
    if session.is_closed() {
        events.clear();
        return;
    }
    for event in events.drain(..) {
        if tx.send(event).await.is_err() {
            tracing::debug!("client went away, draining upstream without emitting");
            session.mark_closed();
            break;
        }
    }
    events.clear();
}

async fn drive<S, E>(mut body: S, ctx: ReemitContext, tx: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut session = StreamSession::new(ctx.model.clone(), ctx.input_estimate);
    let mut lines = SseLineBuffer::new();
    let mut payloads: Vec<String> = Vec::new();
    let mut canonical: Vec<CanonicalStreamEvent> = Vec::new();
    let mut events: Vec<StreamEvent> = Vec::new();

    session.start_into(&mut events);
    flush(&tx, &mut session, &mut events).await;

    while !session.is_done() {
        match body.next().await {
            Some(Ok(chunk)) => lines.feed_into(&chunk, &mut payloads),
            Some(Err(err)) => {
                tracing::warn!(model = %ctx.model, "upstream stream failed: {err}");
                session.fail_into(&err.to_string(), &mut events);
                flush(&tx, &mut session, &mut events).await;
                return;
            }
            None => {
                lines.finish_into(&mut payloads);
                apply_payloads(&ctx, &mut session, &mut payloads, &mut canonical, &mut events);
                session.finish_into(&mut events);
                flush(&tx, &mut session, &mut events).await;
                break;
            }
        }
        apply_payloads(&ctx, &mut session, &mut payloads, &mut canonical, &mut events);
        flush(&tx, &mut session, &mut events).await;
    }

    tracing::debug!(
        model = %ctx.model,
        state = ?session.state(),
        client_closed = session.is_closed(),
        text_bytes = session.text().len(),
        tool_calls = session.emitted_calls().len(),
        "stream session ended"
    );

    if session.is_finalized() {
        let usage = session.usage();
        ctx.ledger.record_and_persist(usage).await;
        log_request_usage(&ctx.model, &ctx.upstream_model, &usage, ctx.started.elapsed());
    }
}

fn apply_payloads(
    ctx: &ReemitContext,
    session: &mut StreamSession,
    payloads: &mut Vec<String>,
    canonical: &mut Vec<CanonicalStreamEvent>,
    events: &mut Vec<StreamEvent>,
) {
    for payload in payloads.drain(..) {
        decode_payload(ctx.provider, &payload, canonical);
        for event in canonical.drain(..) {
            session.apply_into(event, events);
        }
    }
}
