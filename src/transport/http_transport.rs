use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::ProxyError;

// `read_timeout` resets on every body read; only a stalled stream is cut.
fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    read_timeout: Duration,
    use_env_proxy: bool,
) -> Result<reqwest::Client, ProxyError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .read_timeout(read_timeout);

    if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| ProxyError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Pooled HTTP client for the upstream provider.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    // Deadline for the response head; the body is only idle-bounded.
    response_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with connection pooling. `server.timeout` bounds
    /// the wait for response headers and each idle gap while reading the
    /// body.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Transport`] when the TLS backend or client cannot
    /// be initialized.
    pub fn new(config: &ServerConfig) -> Result<Self, ProxyError> {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };
        let timeout = Duration::from_secs(config.timeout);
        let client = build_reqwest_client(
            config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            timeout,
            config.http_use_env_proxy,
        )?;
        Ok(Self {
            client,
            response_timeout: timeout,
        })
    }

    /// POST `body` and return the response for incremental reading.
    ///
    /// Non-2xx responses are read to completion and surfaced as
    /// [`ProxyError::Upstream`] with the upstream status and body text. No
    /// retries are attempted.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Transport`] when the request cannot be sent or
    /// no response head arrives in time, and [`ProxyError::Upstream`] for
    /// non-success statuses.
    pub async fn send_stream(
        &self,
        url: &str,
        headers: &http::HeaderMap,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        let pending = self
            .client
            .post(url)
            .headers(headers.clone())
            .body(body)
            .send();
        let response = tokio::time::timeout(self.response_timeout, pending)
            .await
            .map_err(|_| {
                ProxyError::Transport(format!(
                    "upstream did not respond within {}s",
                    self.response_timeout.as_secs()
                ))
            })?
            .map_err(|err| ProxyError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => status
                .canonical_reason()
                .unwrap_or("upstream error")
                .to_string(),
            Err(err) => format!("failed to read upstream error body: {err}"),
        };
        tracing::warn!(status = status.as_u16(), "upstream returned an error status");
        Err(ProxyError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}
