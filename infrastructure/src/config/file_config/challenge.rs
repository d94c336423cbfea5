//! Anti-bot challenge handling (`[challenge]` section)
//!
//! ```toml
//! [challenge]
//! signatures = ["Just a moment...", "Attention Required!"]
//! max_refresh_attempts = 2
//! backoff_seconds = 5
//! ```

use relay_domain::stream::DEFAULT_CHALLENGE_SIGNATURES;
use relay_domain::{ChallengeDetector, ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileChallengeConfig {
    /// Substrings identifying an interstitial challenge page
    pub signatures: Vec<String>,
    /// Refresh cycles allowed per request before giving up
    pub max_refresh_attempts: u32,
    /// Wait between the refresh command and the resubmission
    pub backoff_seconds: u64,
}

impl Default for FileChallengeConfig {
    fn default() -> Self {
        Self {
            signatures: DEFAULT_CHALLENGE_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_refresh_attempts: 1,
            backoff_seconds: 5,
        }
    }
}

impl FileChallengeConfig {
    pub fn detector(&self) -> ChallengeDetector {
        ChallengeDetector::new(self.signatures.iter().cloned())
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_seconds)
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        if self.signatures.iter().all(|s| s.is_empty()) {
            return vec![ConfigIssue::warning(
                ConfigIssueCode::MissingValue {
                    field: "challenge.signatures".to_string(),
                },
                "challenge.signatures is empty; challenge pages will not be detected",
            )];
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_defaults() {
        let config = FileChallengeConfig::default();
        assert_eq!(config.signatures.len(), 3);
        assert_eq!(config.max_refresh_attempts, 1);
        assert_eq!(config.backoff(), Duration::from_secs(5));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_empty_signatures_warn() {
        let toml_str = r#"
[challenge]
signatures = []
"#;
        let config: super::super::FileConfig = toml::from_str(toml_str).unwrap();
        let issues = config.challenge.validate();
        assert_eq!(issues.len(), 1);
        assert!(!issues[0].is_error());
        assert!(config.challenge.detector().detect("Just a moment...").is_none());
    }
}
