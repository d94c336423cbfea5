//! Chat backends other than the peer relay

pub mod http;

pub use http::HttpChatBackend;

use crate::config::{BRIDGE_BACKEND, FileConfig};
use crate::peer::{RelayChatBackend, RelayState};
use relay_application::BackendSet;
use std::sync::Arc;

/// The relay backend plus one HTTP backend per `[backends.<name>]` section.
pub fn build_backend_set(config: &FileConfig, relay: Arc<RelayState>) -> BackendSet {
    let mut set = BackendSet::new().with(Arc::new(RelayChatBackend::new(relay)));
    for (name, section) in &config.backends {
        if name == BRIDGE_BACKEND || section.base_url.trim().is_empty() {
            continue;
        }
        set.insert(Arc::new(HttpChatBackend::from_config(name.clone(), section)));
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelCatalog;
    use crate::config::FileBackendConfig;
    use crate::peer::RelaySettings;

    #[test]
    fn includes_bridge_and_configured_backends() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ModelCatalog::load(dir.path().join("m.json"), dir.path().join("e.json"));
        let relay = Arc::new(RelayState::new(RelaySettings::default(), catalog));

        let mut config = FileConfig::default();
        config.backends.insert(
            "ollama".into(),
            FileBackendConfig {
                base_url: "http://localhost:11434/v1".into(),
                ..FileBackendConfig::default()
            },
        );
        config
            .backends
            .insert("broken".into(), FileBackendConfig::default());
        config
            .backends
            .insert(BRIDGE_BACKEND.into(), FileBackendConfig::default());

        let set = build_backend_set(&config, relay);
        assert_eq!(set.names(), vec!["bridge", "ollama"]);
    }
}
