//! `ChatBackend` adapter that routes job turns through the peer.

use super::error::RelayError;
use super::relay::RelayState;
use crate::config::BRIDGE_BACKEND;
use async_trait::async_trait;
use relay_application::{BackendError, ChatBackend};
use relay_domain::ChatCompletionRequest;
use std::sync::Arc;
use tracing::debug;

impl From<RelayError> for BackendError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::PeerUnavailable => BackendError::PeerUnavailable,
            RelayError::ServerBusy | RelayError::RateLimited => {
                BackendError::CapacityExceeded(e.to_string())
            }
            RelayError::ChallengeUnresolved { attempts } => {
                BackendError::ChallengeUnresolved { attempts }
            }
            RelayError::Upstream(message) => BackendError::Upstream(message),
            RelayError::Timeout(secs) => BackendError::Timeout(secs),
            RelayError::Translation(_)
            | RelayError::MissingAuthorization
            | RelayError::InvalidApiKey => BackendError::Configuration(e.to_string()),
            RelayError::DuplicateCorrelation(_) | RelayError::Serialization(_) => {
                BackendError::Other(e.to_string())
            }
        }
    }
}

/// Sends each turn as an aggregated request over the shared relay.
///
/// Job turns skip the client rate limit and API key; they still need a
/// connected peer and a free channel. The reply text is returned unannotated:
/// the content-filter note is for chat clients, not for job documents.
pub struct RelayChatBackend {
    state: Arc<RelayState>,
}

impl RelayChatBackend {
    pub fn new(state: Arc<RelayState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ChatBackend for RelayChatBackend {
    fn name(&self) -> &str {
        BRIDGE_BACKEND
    }

    async fn complete(&self, request: ChatCompletionRequest) -> Result<String, BackendError> {
        self.state.ensure_capacity()?;
        let call = self.state.open(&request)?;
        debug!(request_id = %call.id(), model = %request.model, "Job turn dispatched");
        Ok(call.collect_text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelCatalog;
    use crate::peer::relay::RelaySettings;
    use relay_domain::{ChatMessage, TranslationOptions};
    use serde_json::{Value, json};

    fn state() -> (tempfile::TempDir, Arc<RelayState>) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ModelCatalog::load(dir.path().join("m.json"), dir.path().join("e.json"));
        let settings = RelaySettings {
            translation: TranslationOptions {
                session_id: Some("s".into()),
                message_id: Some("m".into()),
                ..Default::default()
            },
            ..RelaySettings::default()
        };
        (dir, Arc::new(RelayState::new(settings, catalog)))
    }

    #[test]
    fn relay_errors_map_onto_backend_errors() {
        assert_eq!(
            BackendError::from(RelayError::ServerBusy),
            BackendError::CapacityExceeded("Server busy".into())
        );
        assert_eq!(
            BackendError::from(RelayError::ChallengeUnresolved { attempts: 1 }),
            BackendError::ChallengeUnresolved { attempts: 1 }
        );
        assert!(!BackendError::from(RelayError::Translation(
            relay_domain::TranslationError::MissingIdentifiers
        ))
        .is_retriable());
    }

    #[tokio::test]
    async fn without_peer_is_unavailable() {
        let (_dir, state) = state();
        let backend = RelayChatBackend::new(state);
        assert_eq!(backend.name(), "bridge");
        let request = ChatCompletionRequest::new("m", vec![ChatMessage::user("hi")]);
        assert_eq!(
            backend.complete(request).await,
            Err(BackendError::PeerUnavailable)
        );
    }

    #[tokio::test]
    async fn returns_aggregated_text() {
        let (_dir, state) = state();
        let (_epoch, mut rx) = state.peer_connected();
        let peer_state = Arc::clone(&state);
        tokio::spawn(async move {
            let text = rx.recv().await.unwrap();
            let message: Value = serde_json::from_str(&text).unwrap();
            let id = message["request_id"].as_str().unwrap().to_string();
            for data in [json!(r#"a0:"chapter one""#), json!("[DONE]")] {
                peer_state
                    .handle_inbound(&json!({"request_id": id, "data": data}).to_string());
            }
        });

        let backend = RelayChatBackend::new(state);
        let request = ChatCompletionRequest::new("m", vec![ChatMessage::user("write")]);
        assert_eq!(backend.complete(request).await.unwrap(), "chapter one");
    }

    #[tokio::test]
    async fn filter_phrases_reach_the_job_unannotated() {
        let (_dir, state) = state();
        let (_epoch, mut rx) = state.peer_connected();
        let peer_state = Arc::clone(&state);
        tokio::spawn(async move {
            let text = rx.recv().await.unwrap();
            let message: Value = serde_json::from_str(&text).unwrap();
            let id = message["request_id"].as_str().unwrap().to_string();
            for data in [
                json!(r#"a0:"Rainwater is filtered through sand and gravel.""#),
                json!("[DONE]"),
            ] {
                peer_state
                    .handle_inbound(&json!({"request_id": id, "data": data}).to_string());
            }
        });

        let backend = RelayChatBackend::new(state);
        let request = ChatCompletionRequest::new("m", vec![ChatMessage::user("write")]);
        assert_eq!(
            backend.complete(request).await.unwrap(),
            "Rainwater is filtered through sand and gravel."
        );
    }
}
