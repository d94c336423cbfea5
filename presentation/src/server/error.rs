//! HTTP error mapping

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_application::SupervisorError;
use relay_infrastructure::RelayError;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Jobs(#[from] SupervisorError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Relay(e) => match e {
                RelayError::PeerUnavailable
                | RelayError::ServerBusy
                | RelayError::ChallengeUnresolved { .. } => StatusCode::SERVICE_UNAVAILABLE,
                RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                RelayError::MissingAuthorization | RelayError::InvalidApiKey => {
                    StatusCode::UNAUTHORIZED
                }
                RelayError::Translation(_) => StatusCode::BAD_REQUEST,
                RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
                RelayError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
                RelayError::DuplicateCorrelation(_) | RelayError::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Jobs(e) => match e {
                e if e.is_not_found() => StatusCode::NOT_FOUND,
                SupervisorError::InvalidState { .. } | SupervisorError::Conflict { .. } => {
                    StatusCode::CONFLICT
                }
                SupervisorError::UnknownBackend(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Relay(e) => e.kind(),
            ApiError::Jobs(_) => "job_error",
            ApiError::Unauthorized => "authentication_error",
            ApiError::BadRequest(_) | ApiError::PayloadTooLarge => "invalid_request_error",
            ApiError::Unavailable(_) => "peer_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "Request failed: {self}");
        } else {
            tracing::debug!(status = status.as_u16(), "Request rejected: {self}");
        }
        let body = json!({"error": {"message": self.to_string(), "type": self.kind()}});
        (status, Json(body)).into_response()
    }
}
