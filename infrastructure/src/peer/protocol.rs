//! Wire messages exchanged with the automation peer over the socket.

use relay_domain::ProviderEnvelope;
use relay_domain::stream::DONE_SENTINEL;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item queued on a correlation slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerDelivery {
    /// Raw framed text, decoded by the consumer.
    Chunk(String),
    /// The peer finished relaying the response.
    Done,
    /// Terminal failure reported by the peer or the relay itself.
    Error(String),
}

impl PeerDelivery {
    /// Classify the `data` field of an inbound message.
    pub fn from_data(data: Value) -> Self {
        match data {
            Value::String(s) if s == DONE_SENTINEL => PeerDelivery::Done,
            Value::String(s) => PeerDelivery::Chunk(s),
            Value::Object(map) if map.contains_key("error") => {
                let message = match map.get("error") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                PeerDelivery::Error(message)
            }
            other => PeerDelivery::Chunk(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PeerDelivery::Chunk(_))
    }
}

/// Commands pushed to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerCommand {
    Refresh,
    Reconnect,
    ActivateIdCapture,
    SendPageSource,
}

/// Messages sent from the relay to the peer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Request {
        request_id: String,
        payload: ProviderEnvelope,
    },
    Command {
        command: PeerCommand,
    },
}

impl OutboundMessage {
    pub fn command(command: PeerCommand) -> Self {
        OutboundMessage::Command { command }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Messages received from the peer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}
