//! Internal endpoints used by the browser helper and operators.
//!
//! All of them require the `x-internal-token` header.

use super::auth::require_internal;
use super::error::ApiError;
use super::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use relay_infrastructure::{PeerCommand, RelayError, extract_models_from_html};
use regex::Regex;
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

static ID_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-:.]{1,200}$").expect("valid id regex"));

fn send(app: &AppState, command: PeerCommand, message: &str) -> Result<Json<Value>, ApiError> {
    match app.relay.send_command(command) {
        Ok(()) => Ok(Json(json!({"status": "success", "message": message}))),
        Err(RelayError::PeerUnavailable) => Err(ApiError::Unavailable(
            "Browser client not connected.".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// `POST /internal/start_id_capture`
pub async fn start_id_capture(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_internal(&app, &headers)?;
    send(&app, PeerCommand::ActivateIdCapture, "Activation command sent.")
}

/// `POST /internal/request_model_update`
pub async fn request_model_update(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_internal(&app, &headers)?;
    send(&app, PeerCommand::SendPageSource, "Page source request sent.")
}

/// `POST /internal/update_available_models`: body is the page source.
pub async fn update_available_models(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    require_internal(&app, &headers)?;
    if body.len() > app.max_internal_post_bytes() {
        return Err(ApiError::PayloadTooLarge);
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.contains("text/html") {
        return Err(ApiError::BadRequest(
            "Content-Type must be text/html".to_string(),
        ));
    }

    let html = String::from_utf8_lossy(&body);
    let Some(models) = extract_models_from_html(&html) else {
        warn!(bytes = body.len(), "No models found in page source");
        return Ok(Json(
            json!({"status": "error", "message": "No models found in HTML source"}),
        ));
    };
    let count = app
        .relay
        .catalog()
        .write_models(models)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Updated {count} models"),
        "count": count,
    })))
}

/// `POST /internal/id_capture/update`
pub async fn update_captured_ids(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require_internal(&app, &headers)?;
    let field = |camel: &str, snake: &str| {
        body.get(camel)
            .or_else(|| body.get(snake))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let (Some(session_id), Some(message_id)) = (
        field("sessionId", "session_id"),
        field("messageId", "message_id"),
    ) else {
        return Err(ApiError::BadRequest(
            "sessionId and messageId are required".to_string(),
        ));
    };
    if !ID_FORMAT.is_match(&session_id) || !ID_FORMAT.is_match(&message_id) {
        return Err(ApiError::BadRequest("Invalid id format".to_string()));
    }

    app.update_captured_ids(&session_id, &message_id)?;
    Ok(Json(json!({
        "status": "success",
        "message": "IDs updated successfully",
        "session_id": session_id,
        "message_id": message_id,
    })))
}

/// `GET /internal/config`
pub async fn show_config(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_internal(&app, &headers)?;
    Ok(Json(app.config_view()))
}

/// `POST /internal/reload`
pub async fn reload(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_internal(&app, &headers)?;
    let version = app.reload()?;
    info!(version, "Reload requested");
    Ok(Json(json!({"ok": true, "reloaded": true, "version": version})))
}
