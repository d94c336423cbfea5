//! `GET /v1/models` and `GET /health`

use super::state::AppState;
use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};
use std::sync::Arc;

pub async fn list_models(State(app): State<Arc<AppState>>) -> Json<Value> {
    let created = app.started_at().timestamp();
    let data: Vec<Value> = app
        .relay
        .catalog()
        .model_names()
        .into_iter()
        .map(|name| json!({"id": name, "object": "model", "created": created, "owned_by": "user"}))
        .collect();
    Json(json!({"object": "list", "data": data}))
}

pub async fn health(State(app): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "ts": chrono::Utc::now().to_rfc3339(),
        "ws_connected": app.relay.hub().is_connected(),
        "last_activity": app.relay.last_activity().to_rfc3339(),
        "open_requests": app.relay.registry().len(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
