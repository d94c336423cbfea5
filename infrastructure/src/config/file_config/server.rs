//! Gateway server configuration from TOML (`[server]` section)
//!
//! Example configuration:
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 5102
//! max_channels = 200
//! stream_response_timeout_seconds = 360
//! api_key = "sk-local"
//! ```

use relay_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP listener and request-gateway settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileServerConfig {
    pub host: String,
    pub port: u16,
    /// Ceiling on concurrently open correlation slots
    pub max_channels: usize,
    /// Per-wait timeout on a slot's delivery queue
    pub stream_response_timeout_seconds: u64,
    /// Optional bearer key required on `/v1/chat/completions`
    pub api_key: Option<String>,
    /// Send the peer a reconnect command after a long idle period
    pub enable_idle_restart: bool,
    pub idle_restart_timeout_seconds: u64,
    /// Model name -> upstream id (or `{id, type}`) map
    pub models_file: String,
    /// Model name -> endpoint mapping(s)
    pub endpoint_map_file: String,
}

impl Default for FileServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5102,
            max_channels: 200,
            stream_response_timeout_seconds: 360,
            api_key: None,
            enable_idle_restart: false,
            idle_restart_timeout_seconds: 3600,
            models_file: "models.json".to_string(),
            endpoint_map_file: "model_endpoint_map.json".to_string(),
        }
    }
}

impl FileServerConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_response_timeout_seconds)
    }

    /// The configured key, ignoring blank values.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.max_channels == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidConstraint {
                    field: "server.max_channels".to_string(),
                },
                "server.max_channels must be at least 1; every request would be rejected",
            ));
        }
        if self.stream_response_timeout_seconds == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidConstraint {
                    field: "server.stream_response_timeout_seconds".to_string(),
                },
                "server.stream_response_timeout_seconds cannot be 0",
            ));
        }
        if self.enable_idle_restart && self.idle_restart_timeout_seconds == 0 {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::InvalidConstraint {
                    field: "server.idle_restart_timeout_seconds".to_string(),
                },
                "server.idle_restart_timeout_seconds is 0; idle restart stays disabled",
            ));
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = FileServerConfig::default();
        assert_eq!(config.port, 5102);
        assert_eq!(config.max_channels, 200);
        assert_eq!(config.response_timeout(), Duration::from_secs(360));
        assert!(config.api_key().is_none());
        assert!(!config.enable_idle_restart);
    }

    #[test]
    fn test_server_config_deserialize() {
        let toml_str = r#"
[server]
port = 8080
max_channels = 5
api_key = "  "
"#;
        let config: super::super::FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_channels, 5);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.server.api_key().is_none());
    }

    #[test]
    fn test_zero_channels_is_error() {
        let config = FileServerConfig {
            max_channels: 0,
            ..Default::default()
        };
        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_error());
    }
}
