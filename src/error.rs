use crate::protocol::error_shapes::messages_error_payload;

/// Error type shared by the request pipeline and the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol translation error: {0}")]
    Translation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    NotFound,
    RateLimit,
    Overloaded,
    ServerError,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 | 413 | 422 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        404 => ErrorCategory::NotFound,
        429 => ErrorCategory::RateLimit,
        503 | 529 => ErrorCategory::Overloaded,
        _ => ErrorCategory::ServerError,
    }
}

impl ProxyError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProxyError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            ProxyError::Config(_)
            | ProxyError::Transport(_)
            | ProxyError::Translation(_)
            | ProxyError::Internal(_) => ErrorCategory::ServerError,
            ProxyError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    /// HTTP status to answer with. Upstream failures keep the upstream code.
    #[must_use]
    pub fn http_status(&self) -> http::StatusCode {
        if let ProxyError::Upstream { status, .. } = self {
            if let Ok(code) = http::StatusCode::from_u16(*status) {
                return code;
            }
        }
        http_status_for_category(self.category())
    }

    /// Message surfaced to the client. Upstream errors carry the raw body text.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            ProxyError::Upstream { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => http::StatusCode::FORBIDDEN,
        ErrorCategory::NotFound => http::StatusCode::NOT_FOUND,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::Overloaded => http::StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Format an error as (`status_code`, Messages-style JSON body).
#[must_use]
pub fn format_error(err: &ProxyError) -> (http::StatusCode, serde_json::Value) {
    let body = messages_error_payload(err.category(), &err.client_message());
    (err.http_status(), body)
}

impl axum::response::IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}
