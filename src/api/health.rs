use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status, a config summary and the current usage totals.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "messages-relay is running",
        "config": {
            "provider": config.upstream.provider.to_string(),
            "default_model": config.upstream.default_model,
            "model_map_count": config.upstream.model_map.len(),
            "log_level": config.features.log_level,
        },
        "usage": state.ledger.snapshot(),
    }))
}
