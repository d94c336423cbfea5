//! `POST /v1/chat/completions`

use super::error::ApiError;
use super::sse::{aggregated_response, completion_id, sse_response};
use super::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use relay_domain::ChatCompletionRequest;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub async fn chat_completions(
    State(app): State<Arc<AppState>>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let client = peer_addr.ip().to_string();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    app.relay.gate(Some(&client), authorization)?;

    let request: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))?;
    app.relay.touch();

    let call = app.relay.open(&request)?;
    let created = chrono::Utc::now().timestamp();
    info!(
        request_id = %call.id(),
        model = %request.model,
        stream = request.stream,
        messages = request.messages.len(),
        "Chat completion"
    );

    if request.stream {
        return Ok(sse_response(call, created).into_response());
    }

    let id = completion_id(call.id());
    let model = call.model().to_string();
    let completion = call.collect().await?;
    Ok(Json(aggregated_response(&id, &model, created, &completion)).into_response())
}
