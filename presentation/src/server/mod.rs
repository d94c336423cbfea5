//! HTTP and WebSocket surface of the gateway.

pub mod admin;
pub mod auth;
pub mod chat;
pub mod error;
pub mod jobs;
pub mod meta;
pub mod peer_ws;
pub mod sse;
pub mod state;

pub use error::ApiError;
pub use state::{AppState, ConfigSource};

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::sync::Arc;

/// All routes over shared `state`.
///
/// `/v1/chat/completions` reads the client address, so serve the router with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(peer_ws::peer_socket))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/models", get(meta::list_models))
        .route("/health", get(meta::health))
        .route("/v1/health", get(meta::health))
        .route("/internal/start_id_capture", post(admin::start_id_capture))
        .route("/internal/request_model_update", post(admin::request_model_update))
        .route(
            "/internal/update_available_models",
            post(admin::update_available_models).layer(DefaultBodyLimit::disable()),
        )
        .route("/internal/id_capture/update", post(admin::update_captured_ids))
        .route("/internal/config", get(admin::show_config))
        .route("/internal/reload", post(admin::reload))
        .route("/api/jobs", get(jobs::list_jobs).post(jobs::submit_job))
        .route("/api/jobs/{id}", get(jobs::get_job))
        .route("/api/jobs/{id}/events", get(jobs::job_events))
        .route("/api/jobs/{id}/cancel", post(jobs::cancel_job))
        .route("/api/jobs/{id}/resume", post(jobs::resume_job))
        .route("/api/jobs/{id}/fork", post(jobs::fork_job))
        .route("/api/jobs/{id}/next", post(jobs::steer_job))
        .with_state(state)
}
