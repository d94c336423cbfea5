//! Shared server state

use super::error::ApiError;
use chrono::{DateTime, Utc};
use relay_application::JobSupervisor;
use relay_domain::Severity;
use relay_infrastructure::{ConfigLoader, FileConfig, RelaySettings, RelayState};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

/// Where configuration is (re)loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: Option<PathBuf>,
    pub no_config: bool,
    pub captured_ids_path: PathBuf,
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self {
            path: None,
            no_config: false,
            captured_ids_path: ConfigLoader::captured_ids_path(),
        }
    }
}

impl ConfigSource {
    pub fn load(&self) -> Result<FileConfig, String> {
        if self.no_config {
            return Ok(ConfigLoader::load_defaults());
        }
        ConfigLoader::load(self.path.as_ref()).map_err(|e| e.to_string())
    }
}

/// Everything handlers share.
pub struct AppState {
    pub relay: Arc<RelayState>,
    pub jobs: Arc<JobSupervisor>,
    config: RwLock<FileConfig>,
    source: ConfigSource,
    version: AtomicU64,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        relay: Arc<RelayState>,
        jobs: Arc<JobSupervisor>,
        config: FileConfig,
        source: ConfigSource,
    ) -> Self {
        Self {
            relay,
            jobs,
            config: RwLock::new(config),
            source,
            version: AtomicU64::new(1),
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> FileConfig {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Token guarding admin and job endpoints, if configured.
    pub fn internal_token(&self) -> Option<String> {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .admin
            .token()
            .map(str::to_string)
    }

    pub fn max_internal_post_bytes(&self) -> usize {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .admin
            .max_internal_post_bytes
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Re-read configuration and model files and apply them.
    pub fn reload(&self) -> Result<u64, ApiError> {
        let config = self.source.load().map_err(|e| {
            error!("Configuration reload failed: {e}");
            ApiError::Internal(format!("Configuration reload failed: {e}"))
        })?;
        for issue in config.validate() {
            match issue.severity {
                Severity::Error => error!("{}", issue.message),
                Severity::Warning => warn!("{}", issue.message),
            }
        }
        self.adopt(config);
        self.relay.catalog().reload();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        info!(version, "Configuration reloaded");
        Ok(version)
    }

    /// Persist captured upstream ids and use them from now on.
    pub fn update_captured_ids(&self, session_id: &str, message_id: &str) -> Result<(), ApiError> {
        ConfigLoader::save_captured_ids(&self.source.captured_ids_path, session_id, message_id)
            .map_err(|e| ApiError::Internal(format!("Failed to save captured ids: {e}")))?;
        let mut config = self.config();
        config.translator.session_id = Some(session_id.to_string());
        config.translator.message_id = Some(message_id.to_string());
        self.adopt(config);
        info!(session_id, message_id, "Captured ids updated");
        Ok(())
    }

    fn adopt(&self, config: FileConfig) {
        self.relay.apply_settings(RelaySettings::from_config(&config));
        self.jobs
            .scheduler()
            .set_policy(config.scheduler.parse_policy().0);
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    /// Non-secret view of the effective configuration.
    pub fn config_view(&self) -> Value {
        let config = self.config();
        json!({
            "bridge": {
                "session_id": config.translator.session_id,
                "message_id": config.translator.message_id,
            },
            "tavern_mode_enabled": config.translator.tavern_mode_enabled,
            "bypass_enabled": config.translator.bypass_enabled,
            "enable_idle_restart": config.server.enable_idle_restart,
            "idle_restart_timeout_seconds": config.server.idle_restart_timeout_seconds,
            "stream_response_timeout_seconds": config.server.stream_response_timeout_seconds,
            "api_key_set": config.server.api_key().is_some(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::app;

    #[test]
    fn captured_ids_apply_immediately_and_persist() {
        let app = app(Some("t"));
        app.state.update_captured_ids("new-sess", "new-msg").unwrap();
        let view = app.state.config_view();
        assert_eq!(view["bridge"]["session_id"], "new-sess");
        assert_eq!(
            app.state.relay.settings().translation.message_id.as_deref(),
            Some("new-msg")
        );
        let saved = std::fs::read_to_string(app.dir.path().join("captured_ids.toml")).unwrap();
        assert!(saved.contains("new-sess"));
    }

    #[test]
    fn reload_bumps_version() {
        let app = app(None);
        let before = app.state.version();
        assert_eq!(app.state.reload().unwrap(), before + 1);
        assert_eq!(app.state.version(), before + 1);
    }

    #[test]
    fn config_view_hides_secrets() {
        let app = app(Some("secret-token"));
        let view = app.state.config_view().to_string();
        assert!(!view.contains("secret-token"));
        assert!(view.contains("\"api_key_set\":false"));
    }
}
