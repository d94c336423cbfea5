//! Payload translation into the peer's provider envelope.
//!
//! The upstream chat UI expects a list of message templates, each tagged with
//! the participant slot (`a` or `b`) it belongs to, plus the conversation ids
//! the automation peer should post into. [`translate`] is deterministic; the
//! only random step is [`EndpointEntry::choose`], which takes the chooser as a
//! parameter.

use super::message::{ChatMessage, Role};
use super::request::ChatCompletionRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while preparing a request for the peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("Session ID/Message ID not configured.")]
    MissingIdentifiers,
}

/// Which participant column of the upstream UI a message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParticipantPosition {
    #[default]
    #[serde(rename = "a", alias = "A")]
    A,
    #[serde(rename = "b", alias = "B")]
    B,
}

impl ParticipantPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantPosition::A => "a",
            ParticipantPosition::B => "b",
        }
    }

    /// Lenient parse used for configuration values.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "a" | "A" => Some(ParticipantPosition::A),
            "b" | "B" => Some(ParticipantPosition::B),
            _ => None,
        }
    }
}

impl fmt::Display for ParticipantPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation sub-mode of the upstream UI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConversationMode {
    /// One target model; the system prompt sits in slot `b`.
    #[default]
    DirectChat,
    /// Shared multi-target conversation; everything goes to the battle target.
    Battle,
    Other(String),
}

impl ConversationMode {
    pub fn as_str(&self) -> &str {
        match self {
            ConversationMode::DirectChat => "direct_chat",
            ConversationMode::Battle => "battle",
            ConversationMode::Other(s) => s,
        }
    }
}

impl From<String> for ConversationMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            "direct_chat" => ConversationMode::DirectChat,
            "battle" => ConversationMode::Battle,
            _ => ConversationMode::Other(s),
        }
    }
}

impl From<ConversationMode> for String {
    fn from(mode: ConversationMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured upstream destination for a model.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndpointMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ConversationMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battle_target: Option<ParticipantPosition>,
}

/// A model's endpoint map entry: a single mapping or several equivalent ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointEntry {
    Many(Vec<EndpointMapping>),
    One(EndpointMapping),
}

impl EndpointEntry {
    /// Pick the mapping to use for one request.
    ///
    /// `pick(n)` must return an index below `n`; out-of-range values are
    /// clamped. An empty list yields `None`.
    pub fn choose(&self, pick: &mut dyn FnMut(usize) -> usize) -> Option<&EndpointMapping> {
        match self {
            EndpointEntry::One(mapping) => Some(mapping),
            EndpointEntry::Many(list) if list.is_empty() => None,
            EndpointEntry::Many(list) => {
                let idx = pick(list.len()).min(list.len() - 1);
                list.get(idx)
            }
        }
    }
}

/// Translator switches and configured fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationOptions {
    /// Merge every system message instead of keeping only the last one.
    pub tavern_mode_enabled: bool,
    /// Append a trailing single-space user message for text models.
    pub bypass_enabled: bool,
    /// Configured mode used when no mapping chose one.
    pub default_mode: Option<ConversationMode>,
    /// Configured battle target used when no mapping chose one.
    pub default_battle_target: Option<ParticipantPosition>,
    /// Ids used when neither the request nor the mapping supplies them.
    pub session_id: Option<String>,
    pub message_id: Option<String>,
}

/// Everything about the destination needed to build an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub target_model_id: Option<String>,
    pub session_id: String,
    pub message_id: String,
    pub mode: ConversationMode,
    pub battle_target: ParticipantPosition,
    pub is_image_request: bool,
}

impl Route {
    /// Resolve ids, mode and battle target from the request, the chosen
    /// mapping and the options, in that order of precedence.
    pub fn resolve(
        request: &ChatCompletionRequest,
        mapping: Option<&EndpointMapping>,
        options: &TranslationOptions,
    ) -> Result<Self, TranslationError> {
        let pick = |from_request: &Option<String>,
                    from_mapping: Option<&Option<String>>,
                    configured: &Option<String>| {
            from_request
                .clone()
                .or_else(|| from_mapping.cloned().flatten())
                .or_else(|| configured.clone())
                .filter(|s| !s.trim().is_empty())
        };

        let session_id = pick(
            &request.bridge_session_id,
            mapping.map(|m| &m.session_id),
            &options.session_id,
        );
        let message_id = pick(
            &request.bridge_message_id,
            mapping.map(|m| &m.message_id),
            &options.message_id,
        );
        let (Some(session_id), Some(message_id)) = (session_id, message_id) else {
            return Err(TranslationError::MissingIdentifiers);
        };

        let mut mode = mapping
            .and_then(|m| m.mode.clone())
            .unwrap_or_default();
        if mode == ConversationMode::DirectChat
            && let Some(configured) = &options.default_mode
        {
            mode = configured.clone();
        }

        let mut battle_target = mapping.and_then(|m| m.battle_target).unwrap_or_default();
        if battle_target == ParticipantPosition::A
            && let Some(configured) = options.default_battle_target
        {
            battle_target = configured;
        }

        Ok(Self {
            target_model_id: None,
            session_id,
            message_id,
            mode,
            battle_target,
            is_image_request: false,
        })
    }

    pub fn with_target(mut self, target_model_id: Option<String>, is_image_request: bool) -> Self {
        self.target_model_id = target_model_id;
        self.is_image_request = is_image_request;
        self
    }
}

/// One message as the upstream UI expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
    #[serde(rename = "participantPosition")]
    pub participant_position: ParticipantPosition,
}

impl MessageTemplate {
    fn new(role: Role, content: impl Into<String>, position: ParticipantPosition) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
            participant_position: position,
        }
    }
}

/// The payload pushed to the peer under a correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEnvelope {
    pub message_templates: Vec<MessageTemplate>,
    pub target_model_id: Option<String>,
    pub session_id: String,
    pub message_id: String,
    pub is_image_request: bool,
}

/// Translate normalized messages into the provider envelope for `route`.
pub fn translate(
    messages: &[ChatMessage],
    route: &Route,
    options: &TranslationOptions,
) -> ProviderEnvelope {
    let normalized: Vec<ChatMessage> = messages
        .iter()
        .map(|m| match m.role {
            Role::Developer => ChatMessage::system(m.content.clone()),
            _ => m.clone(),
        })
        .collect();

    let (system_pos, other_pos) = match route.mode {
        ConversationMode::DirectChat => (ParticipantPosition::B, ParticipantPosition::A),
        ConversationMode::Battle => (route.battle_target, route.battle_target),
        ConversationMode::Other(_) => (ParticipantPosition::A, ParticipantPosition::A),
    };

    let system_parts: Vec<&str> = normalized
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let mut templates = Vec::with_capacity(normalized.len() + 2);

    if let Some(last) = system_parts.last() {
        let content = if options.tavern_mode_enabled {
            system_parts.join("\n\n")
        } else {
            (*last).to_string()
        };
        templates.push(MessageTemplate::new(Role::System, content, system_pos));
    }

    templates.extend(
        normalized
            .into_iter()
            .filter(|m| m.role != Role::System)
            .map(|m| MessageTemplate::new(m.role, m.content, other_pos)),
    );

    if let Some(first) = templates.first()
        && first.role == Role::Assistant
    {
        let position = first.participant_position;
        templates.insert(0, MessageTemplate::new(Role::User, "Hi", position));
    }

    if options.bypass_enabled && !route.is_image_request {
        templates.push(MessageTemplate::new(Role::User, " ", ParticipantPosition::A));
    }

    ProviderEnvelope {
        message_templates: templates,
        target_model_id: route.target_model_id.clone(),
        session_id: route.session_id.clone(),
        message_id: route.message_id.clone(),
        is_image_request: route.is_image_request,
    }
}
