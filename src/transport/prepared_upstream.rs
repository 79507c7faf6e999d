use crate::config::{UpstreamConfig, UpstreamProvider};
use crate::util::trim_base_url;

/// Upstream endpoint data computed once at startup.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    provider: UpstreamProvider,
    // `{base}/chat/completions` or `{base}/models/`
    endpoint_prefix: String,
    static_headers: http::HeaderMap,
}

impl PreparedUpstream {
    #[must_use]
    pub fn new(upstream: &UpstreamConfig) -> Self {
        let base = trim_base_url(&upstream.base_url);
        let endpoint_prefix = match upstream.provider {
            UpstreamProvider::Gemini => format!("{base}/models/"),
            UpstreamProvider::Openai => format!("{base}/chat/completions"),
        };
        Self {
            provider: upstream.provider,
            endpoint_prefix,
            static_headers: build_provider_headers(upstream),
        }
    }

    #[must_use]
    pub fn provider(&self) -> UpstreamProvider {
        self.provider
    }

    /// Streaming endpoint for `model`. The model is percent-encoded so it
    /// stays one path segment.
    #[must_use]
    pub fn stream_url(&self, model: &str) -> String {
        match self.provider {
            UpstreamProvider::Gemini => {
                let model = urlencoding::encode(model);
                let mut url = String::with_capacity(self.endpoint_prefix.len() + model.len() + 32);
                url.push_str(&self.endpoint_prefix);
                url.push_str(&model);
                url.push_str(":streamGenerateContent?alt=sse");
                url
            }
            UpstreamProvider::Openai => self.endpoint_prefix.clone(),
        }
    }

    /// Content type plus the provider's auth header.
    #[must_use]
    pub fn headers(&self) -> &http::HeaderMap {
        &self.static_headers
    }
}

fn build_provider_headers(upstream: &UpstreamConfig) -> http::HeaderMap {
    let key = upstream.api_key.as_str();

    let mut headers = http::HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    headers.insert(
        http::header::ACCEPT,
        http::HeaderValue::from_static("text/event-stream"),
    );

    match upstream.provider {
        UpstreamProvider::Openai => {
            if let Ok(val) = http::HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(http::header::AUTHORIZATION, val);
            }
        }
        UpstreamProvider::Gemini => {
            if let Ok(val) = http::HeaderValue::from_str(key) {
                headers.insert("x-goog-api-key", val);
            }
        }
    }

    headers
}
