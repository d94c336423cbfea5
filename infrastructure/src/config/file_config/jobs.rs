//! Job supervisor configuration from TOML (`[jobs]` section)
//!
//! ```toml
//! [jobs]
//! dir = ".relay/jobs"
//! default_backend = "bridge"
//! watchdog_seconds = 300
//! max_retries = 3
//! backoff_base_seconds = 1
//! ```

use relay_application::SupervisorParams;
use relay_domain::job::TRANSPLANT_SUMMARY_CHARS;
use relay_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileJobsConfig {
    /// Root directory holding one folder per job
    pub dir: PathBuf,
    /// Backend used when a submission names none
    pub default_backend: String,
    /// A turn without progress for this long stalls the job
    pub watchdog_seconds: u64,
    pub max_retries: u32,
    pub backoff_base_seconds: u64,
    /// How often the scheduler pump looks for admissible jobs
    pub pump_interval_seconds: u64,
    /// Size cap of a fork's transplant summary, in characters
    pub transplant_chars: usize,
}

impl Default for FileJobsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".relay/jobs"),
            default_backend: "bridge".to_string(),
            watchdog_seconds: 300,
            max_retries: 3,
            backoff_base_seconds: 1,
            pump_interval_seconds: 2,
            transplant_chars: TRANSPLANT_SUMMARY_CHARS,
        }
    }
}

impl FileJobsConfig {
    pub fn supervisor_params(&self) -> SupervisorParams {
        SupervisorParams {
            watchdog: Duration::from_secs(self.watchdog_seconds),
            max_retries: self.max_retries,
            backoff_base: Duration::from_secs(self.backoff_base_seconds),
            transplant_chars: self.transplant_chars,
        }
    }

    pub fn pump_interval(&self) -> Duration {
        Duration::from_secs(self.pump_interval_seconds.max(1))
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.watchdog_seconds == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidConstraint {
                    field: "jobs.watchdog_seconds".to_string(),
                },
                "jobs.watchdog_seconds cannot be 0; every turn would stall",
            ));
        }
        if self.default_backend.trim().is_empty() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::MissingValue {
                    field: "jobs.default_backend".to_string(),
                },
                "jobs.default_backend cannot be empty",
            ));
        }
        issues
    }
}
