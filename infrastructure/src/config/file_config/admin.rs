//! Operator endpoint configuration (`[admin]` section)

use relay_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAdminConfig {
    /// Shared secret expected in `x-internal-token`; unset disables the
    /// admin and jobs endpoints
    pub internal_api_token: Option<String>,
    /// Body size cap for page-source uploads
    pub max_internal_post_bytes: usize,
}

impl Default for FileAdminConfig {
    fn default() -> Self {
        Self {
            internal_api_token: None,
            max_internal_post_bytes: 2_000_000,
        }
    }
}

impl FileAdminConfig {
    pub fn token(&self) -> Option<&str> {
        self.internal_api_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        if self.token().is_none() {
            return vec![ConfigIssue::warning(
                ConfigIssueCode::MissingValue {
                    field: "admin.internal_api_token".to_string(),
                },
                "admin.internal_api_token is not set; /internal and /api/jobs endpoints will reject every call",
            )];
        }
        Vec::new()
    }
}
