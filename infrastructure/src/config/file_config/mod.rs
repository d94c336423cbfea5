//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and use domain types where appropriate.

mod admin;
mod backends;
mod challenge;
mod jobs;
mod rate_limit;
mod scheduler;
mod server;
mod translator;

pub use admin::FileAdminConfig;
pub use backends::{BRIDGE_BACKEND, FileBackendConfig};
pub use challenge::FileChallengeConfig;
pub use jobs::FileJobsConfig;
pub use rate_limit::FileRateLimitConfig;
pub use scheduler::FileSchedulerConfig;
pub use server::FileServerConfig;
pub use translator::FileTranslatorConfig;

use relay_domain::{ConfigIssue, ConfigIssueCode, ContinuationPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Listener, channel ceiling, response timeout, API key
    pub server: FileServerConfig,
    /// Per-client burst window
    pub rate_limit: FileRateLimitConfig,
    /// Challenge signatures and refresh budget
    pub challenge: FileChallengeConfig,
    /// Default upstream ids and translation switches
    pub translator: FileTranslatorConfig,
    /// Operator endpoints
    pub admin: FileAdminConfig,
    /// Anchors, extension and repetition thresholds for job sessions
    pub continuation: ContinuationPolicy,
    /// Job storage and run loop
    pub jobs: FileJobsConfig,
    /// Quiet hours and concurrency ceilings
    pub scheduler: FileSchedulerConfig,
    /// OpenAI-compatible backends by name
    pub backends: BTreeMap<String, FileBackendConfig>,
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        issues.extend(self.server.validate());
        issues.extend(self.challenge.validate());
        issues.extend(self.translator.validate());
        issues.extend(self.admin.validate());
        issues.extend(self.jobs.validate());
        issues.extend(self.scheduler.parse_policy().1);
        for (name, backend) in &self.backends {
            issues.extend(backend.validate(name));
        }

        let threshold = self.continuation.repetition_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidConstraint {
                    field: "continuation.repetition_threshold".to_string(),
                },
                format!("continuation.repetition_threshold must be in (0, 1], got {threshold}"),
            ));
        }
        if self.continuation.ngram == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidConstraint {
                    field: "continuation.ngram".to_string(),
                },
                "continuation.ngram must be at least 1",
            ));
        }

        let known_backend = self.jobs.default_backend == BRIDGE_BACKEND
            || self.backends.contains_key(&self.jobs.default_backend);
        if !known_backend {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidConstraint {
                    field: "jobs.default_backend".to_string(),
                },
                format!(
                    "jobs.default_backend '{}' has no [backends.{}] section",
                    self.jobs.default_backend, self.jobs.default_backend
                ),
            ));
        }

        issues
    }
}
