//! Chat backend port
//!
//! Defines how the continuation engine reaches a model. The relay adapter
//! routes through the automation peer; HTTP adapters talk to
//! OpenAI-compatible endpoints.

use async_trait::async_trait;
use relay_domain::ChatCompletionRequest;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while completing a chat request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Userscript client not connected.")]
    PeerUnavailable,

    #[error("Security challenge still present after {attempts} refresh attempts")]
    ChallengeUnresolved { attempts: u32 },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Response timeout after {0} seconds")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl BackendError {
    /// Whether a retry (possibly after backoff) may succeed.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, BackendError::Configuration(_))
    }
}

/// A model endpoint that turns a chat request into the full answer text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name as used in job records and scheduler limits.
    fn name(&self) -> &str;

    /// Send the request and return the aggregated answer.
    async fn complete(&self, request: ChatCompletionRequest) -> Result<String, BackendError>;
}

/// Named backends available to jobs.
#[derive(Clone, Default)]
pub struct BackendSet {
    backends: BTreeMap<String, Arc<dyn ChatBackend>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.insert(backend);
        self
    }

    pub fn insert(&mut self, backend: Arc<dyn ChatBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ChatBackend>> {
        self.backends.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }
}

impl std::fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSet")
            .field("backends", &self.names())
            .finish()
    }
}
