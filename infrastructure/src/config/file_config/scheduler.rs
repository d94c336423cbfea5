//! Job admission configuration from TOML (`[scheduler]` section)
//!
//! ```toml
//! [scheduler]
//! quiet_hours_enabled = true
//! quiet_start = "01:00"
//! quiet_end = "06:00"
//! max_total = 2
//!
//! [scheduler.per_backend]
//! bridge = 1
//! openrouter = 2
//! ```

use relay_domain::{ConcurrencyLimits, ConfigIssue, ConfigIssueCode, QuietHours, SchedulePolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSchedulerConfig {
    pub quiet_hours_enabled: bool,
    /// "HH:MM"; a window with start after end wraps past midnight
    pub quiet_start: String,
    pub quiet_end: String,
    /// Ceiling on Running jobs across all backends
    pub max_total: usize,
    pub per_backend: BTreeMap<String, usize>,
    /// Ceiling for backends missing from `per_backend`
    pub default_backend_limit: usize,
}

impl Default for FileSchedulerConfig {
    fn default() -> Self {
        let limits = ConcurrencyLimits::default();
        Self {
            quiet_hours_enabled: false,
            quiet_start: "01:00".to_string(),
            quiet_end: "06:00".to_string(),
            max_total: limits.total,
            per_backend: limits.per_backend,
            default_backend_limit: limits.fallback,
        }
    }
}

impl FileSchedulerConfig {
    /// Build the admission policy. An unparsable quiet-hours window is
    /// reported and treated as disabled.
    pub fn parse_policy(&self) -> (SchedulePolicy, Vec<ConfigIssue>) {
        let mut issues = Vec::new();
        let quiet_hours = if self.quiet_hours_enabled {
            match QuietHours::parse(&self.quiet_start, &self.quiet_end) {
                Ok(q) => Some(q),
                Err(e) => {
                    issues.push(ConfigIssue::warning(
                        ConfigIssueCode::InvalidConstraint {
                            field: "scheduler.quiet_start".to_string(),
                        },
                        format!("{e}; quiet hours disabled"),
                    ));
                    None
                }
            }
        } else {
            None
        };

        if self.max_total == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidConstraint {
                    field: "scheduler.max_total".to_string(),
                },
                "scheduler.max_total is 0; no job can ever start",
            ));
        }

        let policy = SchedulePolicy {
            quiet_hours,
            limits: ConcurrencyLimits {
                total: self.max_total,
                per_backend: self.per_backend.clone(),
                fallback: self.default_backend_limit,
            },
        };
        (policy, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_defaults() {
        let (policy, issues) = FileSchedulerConfig::default().parse_policy();
        assert!(issues.is_empty());
        assert!(policy.quiet_hours.is_none());
        assert_eq!(policy.limits.total, 1);
        assert_eq!(policy.limits.for_backend("openrouter"), 2);
        assert_eq!(policy.limits.for_backend("custom"), 1);
    }

    #[test]
    fn test_quiet_hours_enabled() {
        let toml_str = r#"
[scheduler]
quiet_hours_enabled = true
quiet_start = "22:30"
quiet_end = "07:00"

[scheduler.per_backend]
ollama = 3
"#;
        let config: super::super::FileConfig = toml::from_str(toml_str).unwrap();
        let (policy, issues) = config.scheduler.parse_policy();
        assert!(issues.is_empty());
        assert!(policy.quiet_hours.is_some());
        assert_eq!(policy.limits.for_backend("ollama"), 3);
        assert_eq!(policy.limits.for_backend("bridge"), 1);
    }

    #[test]
    fn test_bad_quiet_hours_disabled_with_warning() {
        let config = FileSchedulerConfig {
            quiet_hours_enabled: true,
            quiet_start: "25:00".to_string(),
            ..Default::default()
        };
        let (policy, issues) = config.parse_policy();
        assert!(policy.quiet_hours.is_none());
        assert_eq!(issues.len(), 1);
    }
}
