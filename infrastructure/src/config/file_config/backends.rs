//! OpenAI-compatible job backends (`[backends.<name>]` sections)
//!
//! ```toml
//! [backends.openrouter]
//! base_url = "https://openrouter.ai/api/v1"
//! api_key_env = "OPENROUTER_API_KEY"
//! model = "deepseek/deepseek-chat"
//!
//! [backends.ollama]
//! base_url = "http://localhost:11434/v1"
//! ```
//!
//! The `bridge` backend is always available and routes through the peer;
//! it needs no section.

use relay_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the backend served by the automation peer.
pub const BRIDGE_BACKEND: &str = "bridge";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileBackendConfig {
    /// Base URL up to and including `/v1`
    pub base_url: String,
    /// Environment variable holding the bearer key
    pub api_key_env: Option<String>,
    /// Model sent instead of the job's model
    pub model: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for FileBackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key_env: None,
            model: None,
            timeout_seconds: 360,
        }
    }
}

impl FileBackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Resolve the key from the environment; a missing variable yields `None`.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn validate(&self, name: &str) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if name == BRIDGE_BACKEND {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::InvalidConstraint {
                    field: format!("backends.{name}"),
                },
                "backends.bridge is reserved for the automation peer; section ignored",
            ));
        } else if self.base_url.trim().is_empty() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::MissingValue {
                    field: format!("backends.{name}.base_url"),
                },
                format!("backends.{name}.base_url is required"),
            ));
        }
        issues
    }
}
