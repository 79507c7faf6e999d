use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::UpstreamProvider;
use crate::error::ProxyError;
use crate::observability::token_counter::estimate_request_tokens;
use crate::protocol::anthropic::decoder::{decode_inbound_request, DecodedRequest};
use crate::protocol::anthropic::response_encoder::ResponseAccumulator;
use crate::protocol::anthropic::{MessagesRequest, StreamEvent};
use crate::protocol::gemini::encoder::encode_gemini_request;
use crate::protocol::openai_chat::encoder::encode_openai_chat_request;
use crate::state::AppState;
use crate::stream::reemit::{spawn_reemit, ReemitContext};
use crate::stream::sse_body_stream;

/// `POST /v1/messages`
pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match handler_inner(state, body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!("request failed: {err}");
            err.into_response()
        }
    }
}

/// `POST /v1/messages/count_tokens`
pub fn count_tokens_handler(body: &[u8]) -> Response {
    match decode_request(body) {
        Ok(request) => ok_json_response(Bytes::from(
            json!({ "input_tokens": estimate_request_tokens(&request) }).to_string(),
        )),
        Err(err) => err.into_response(),
    }
}

async fn handler_inner(state: Arc<AppState>, body: Bytes) -> Result<Response, ProxyError> {
    let started = Instant::now();
    let request = decode_request(&body)?;
    let upstream_model = state
        .config
        .upstream
        .resolve_model(&request.model)
        .to_string();
    let provider = state.upstream.provider();
    let payload = encode_upstream_body(provider, &request, &upstream_model)?;

    tracing::info!(
        model = %request.model,
        upstream_model = %upstream_model,
        provider = %provider,
        stream = request.stream,
        "relaying request"
    );

    let url = state.upstream.stream_url(&upstream_model);
    let response = state
        .transport
        .send_stream(&url, state.upstream.headers(), payload)
        .await?;

    let ctx = ReemitContext {
        provider,
        model: request.model.clone(),
        upstream_model,
        input_estimate: estimate_request_tokens(&request),
        ledger: Arc::clone(&state.ledger),
        started,
    };
    let events = spawn_reemit(Box::pin(response.bytes_stream()), ctx);

    if request.stream {
        return Ok(sse_ok_response(Body::from_stream(sse_body_stream(events))));
    }
    collect_response(events).await
}

fn decode_request(body: &[u8]) -> Result<MessagesRequest, ProxyError> {
    let DecodedRequest { request, dropped } = decode_inbound_request(body)?;
    if !dropped.is_empty() {
        tracing::debug!(model = %request.model, dropped = ?dropped, "removed unsupported request keys");
    }
    Ok(request)
}

fn encode_upstream_body(
    provider: UpstreamProvider,
    request: &MessagesRequest,
    upstream_model: &str,
) -> Result<Bytes, ProxyError> {
    let encoded = match provider {
        UpstreamProvider::Gemini => {
            serde_json::to_vec(&encode_gemini_request(request, upstream_model))
        }
        UpstreamProvider::Openai => {
            serde_json::to_vec(&encode_openai_chat_request(request, upstream_model))
        }
    };
    encoded
        .map(Bytes::from)
        .map_err(|err| ProxyError::Translation(format!("failed to encode upstream body: {err}")))
}

async fn collect_response(mut events: mpsc::Receiver<StreamEvent>) -> Result<Response, ProxyError> {
    let mut accumulator = ResponseAccumulator::new();
    while let Some(event) = events.recv().await {
        accumulator.push(event);
    }
    let response = accumulator.finish()?;
    let body = serde_json::to_vec(&response)
        .map_err(|err| ProxyError::Internal(format!("failed to encode response: {err}")))?;
    Ok(ok_json_response(Bytes::from(body)))
}

#[inline]
fn ok_json_response(body_bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(body_bytes));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

#[inline]
fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_tokens_estimates_request() {
        let response = count_tokens_handler(
            br#"{"model":"m","messages":[{"role":"user","content":"abcdefgh"}]}"#,
        );
        assert_eq!(response.status(), http::StatusCode::OK);
    }

    #[test]
    fn test_count_tokens_rejects_non_object() {
        let response = count_tokens_handler(b"[1,2]");
        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_encode_upstream_body_per_provider() {
        let request = decode_request(
            br#"{"model":"claude","messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        let gemini: serde_json::Value = serde_json::from_slice(
            &encode_upstream_body(UpstreamProvider::Gemini, &request, "gemini-2.5-flash").unwrap(),
        )
        .unwrap();
        assert_eq!(gemini["contents"][0]["role"], "user");
        let openai: serde_json::Value = serde_json::from_slice(
            &encode_upstream_body(UpstreamProvider::Openai, &request, "gpt-4o").unwrap(),
        )
        .unwrap();
        assert_eq!(openai["model"], "gpt-4o");
        assert_eq!(openai["stream"], true);
    }
}
