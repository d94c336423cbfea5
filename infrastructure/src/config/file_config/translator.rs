//! Payload translation configuration from TOML (`[translator]` section)
//!
//! Holds the default upstream conversation ids. Ids captured from the
//! browser are written to a separate file that is merged over this section.
//!
//! ```toml
//! [translator]
//! session_id = "5f1c..."
//! message_id = "9b2e..."
//! tavern_mode_enabled = false
//! bypass_enabled = true
//! id_updater_last_mode = "direct_chat"
//! id_updater_battle_target = "a"
//! ```

use relay_domain::{
    ConfigIssue, ConfigIssueCode, ConversationMode, ParticipantPosition, TranslationOptions,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTranslatorConfig {
    pub session_id: Option<String>,
    pub message_id: Option<String>,
    /// Merge all system messages instead of keeping only the last one
    pub tavern_mode_enabled: bool,
    /// Append a single-space user turn for text models
    pub bypass_enabled: bool,
    /// Mode recorded at the last id capture: "direct_chat" or "battle"
    pub id_updater_last_mode: Option<String>,
    /// Participant targeted in battle mode: "a" or "b"
    pub id_updater_battle_target: Option<String>,
}

impl FileTranslatorConfig {
    pub fn parse_mode(&self) -> Option<ConversationMode> {
        self.id_updater_last_mode
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| ConversationMode::from(s.to_string()))
    }

    pub fn parse_battle_target(&self) -> (Option<ParticipantPosition>, Vec<ConfigIssue>) {
        let Some(raw) = self.id_updater_battle_target.as_deref() else {
            return (None, Vec::new());
        };
        match ParticipantPosition::parse(raw) {
            Some(pos) => (Some(pos), Vec::new()),
            None => (
                None,
                vec![ConfigIssue::warning(
                    ConfigIssueCode::InvalidEnumValue {
                        field: "translator.id_updater_battle_target".to_string(),
                        value: raw.to_string(),
                        valid_values: vec!["a".to_string(), "b".to_string()],
                    },
                    format!("Unknown battle target '{raw}', falling back to 'a'"),
                )],
            ),
        }
    }

    pub fn to_options(&self) -> TranslationOptions {
        TranslationOptions {
            tavern_mode_enabled: self.tavern_mode_enabled,
            bypass_enabled: self.bypass_enabled,
            default_mode: self.parse_mode(),
            default_battle_target: self.parse_battle_target().0,
            session_id: self.session_id.clone(),
            message_id: self.message_id.clone(),
        }
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = self.parse_battle_target().1;
        if let Some(ConversationMode::Other(mode)) = self.parse_mode() {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::InvalidEnumValue {
                    field: "translator.id_updater_last_mode".to_string(),
                    value: mode.clone(),
                    valid_values: vec!["direct_chat".to_string(), "battle".to_string()],
                },
                format!("Unknown conversation mode '{mode}'; all messages will use position 'a'"),
            ));
        }
        if self.session_id.is_none() || self.message_id.is_none() {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::MissingValue {
                    field: "translator.session_id".to_string(),
                },
                "No default session/message ids; requests need an endpoint mapping or captured ids",
            ));
        }
        issues
    }
}
