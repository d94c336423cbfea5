//! Chat-completion request value object

use super::message::ChatMessage;
use serde::{Deserialize, Deserializer, Serialize};

/// A standard chat-completion request.
///
/// Messages are normalized on deserialization (see [`ChatMessage::from_wire`]).
/// The optional `bridge_*` fields pin the upstream conversation for this one
/// request, taking precedence over the model endpoint map and configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    #[serde(default, deserialize_with = "deserialize_messages")]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_message_id: Option<String>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            bridge_session_id: None,
            bridge_message_id: None,
        }
    }

    pub fn with_bridge_ids(mut self, session_id: Option<String>, message_id: Option<String>) -> Self {
        self.bridge_session_id = session_id;
        self.bridge_message_id = message_id;
        self
    }
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: serde_json::Value,
}

fn deserialize_messages<'de, D>(deserializer: D) -> Result<Vec<ChatMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    let wire = Vec::<WireMessage>::deserialize(deserializer)?;
    Ok(wire
        .into_iter()
        .map(|m| ChatMessage::from_wire(m.role, &m.content))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::Role;
    use serde_json::json;

    #[test]
    fn parses_openai_body() {
        let body = json!({
            "model": "gpt-4o",
            "stream": true,
            "messages": [
                {"role": "developer", "content": "be brief"},
                {"role": "user", "content": [{"type": "text", "text": "hi"}]}
            ],
            "temperature": 0.2
        });
        let req: ChatCompletionRequest = serde_json::from_value(body).unwrap();
        assert!(req.stream);
        assert_eq!(req.messages[0].role, Role::Developer);
        assert_eq!(req.messages[1].content, " ");
        assert!(req.bridge_session_id.is_none());
    }

    #[test]
    fn stream_defaults_to_false() {
        let req: ChatCompletionRequest =
            serde_json::from_value(json!({"model": "m", "messages": []})).unwrap();
        assert!(!req.stream);
    }
}
