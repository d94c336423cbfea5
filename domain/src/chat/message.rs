//! Chat message entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Author role of a chat message.
///
/// Roles outside the known set are carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Newer clients send instructions under this role; it is treated as system.
    Developer,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Developer => "developer",
            Role::Other(s) => s,
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "developer" => Role::Developer,
            _ => Role::Other(s),
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Role::from(s.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized text-only chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<Role>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Normalize a message as received from a client.
    ///
    /// Only string content is kept (structured content such as image parts
    /// becomes empty), and a blank user message becomes a single space since
    /// the upstream UI rejects empty turns.
    pub fn from_wire(role: impl Into<Role>, content: &serde_json::Value) -> Self {
        let role = role.into();
        let mut text = match content {
            serde_json::Value::String(s) => s.clone(),
            _ => String::new(),
        };
        if role == Role::User && text.trim().is_empty() {
            text = " ".to_string();
        }
        Self { role, content: text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_round_trips_unknown_values() {
        let role: Role = serde_json::from_value(json!("tool")).unwrap();
        assert_eq!(role, Role::Other("tool".to_string()));
        assert_eq!(serde_json::to_value(&role).unwrap(), json!("tool"));
        assert_eq!(Role::from("developer"), Role::Developer);
    }

    #[test]
    fn structured_content_becomes_empty() {
        let msg = ChatMessage::from_wire("assistant", &json!([{"type": "image_url"}]));
        assert_eq!(msg.content, "");
    }

    #[test]
    fn blank_user_content_becomes_space() {
        assert_eq!(ChatMessage::from_wire("user", &json!("  \n")).content, " ");
        assert_eq!(ChatMessage::from_wire("user", &json!(null)).content, " ");
        assert_eq!(ChatMessage::from_wire("system", &json!("")).content, "");
    }
}
