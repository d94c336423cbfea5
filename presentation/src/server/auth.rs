//! `x-internal-token` gate for admin and job endpoints

use super::error::ApiError;
use super::state::AppState;
use axum::http::HeaderMap;
use relay_infrastructure::constant_time_eq;

pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// Accept the request only if the configured token was presented.
///
/// With no token configured every internal request is refused.
pub fn require_internal(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.internal_token() else {
        return Err(ApiError::Unauthorized);
    };
    let presented = headers
        .get(INTERNAL_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if constant_time_eq(presented, &expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}
