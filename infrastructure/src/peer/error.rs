//! Error types for the peer relay

use relay_domain::TranslationError;
use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors that can occur while relaying a request through the peer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Userscript client not connected.")]
    PeerUnavailable,

    #[error("Server busy")]
    ServerBusy,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Missing API key")]
    MissingAuthorization,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(
        "Cloudflare security challenge still present after {attempts} refresh attempts. Please manually refresh the browser."
    )]
    ChallengeUnresolved { attempts: u32 },

    #[error("{0}")]
    Upstream(String),

    #[error("Response timeout after {0} seconds")]
    Timeout(u64),

    #[error("Correlation id already registered: {0}")]
    DuplicateCorrelation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Serialization(e.to_string())
    }
}

impl RelayError {
    /// Error `type` used in OpenAI-style error bodies and stream error frames.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::PeerUnavailable => "peer_unavailable",
            RelayError::ServerBusy | RelayError::RateLimited => "capacity_exceeded",
            RelayError::MissingAuthorization | RelayError::InvalidApiKey => "authentication_error",
            RelayError::Translation(_) => "invalid_request_error",
            RelayError::ChallengeUnresolved { .. } => "cloudflare_challenge",
            RelayError::Upstream(_) => "upstream_error",
            RelayError::Timeout(_) => "timeout",
            RelayError::DuplicateCorrelation(_) | RelayError::Serialization(_) => "internal_error",
        }
    }
}
