//! Infrastructure layer for arena-relay
//!
//! Adapters behind the application ports plus the peer relay itself:
//!
//! - [`config`]: layered TOML/env configuration
//! - [`catalog`]: model name and endpoint maps
//! - [`peer`]: peer hub, correlation registry, gateway relay
//! - [`backends`]: OpenAI-compatible HTTP backends
//! - [`jobs`]: file job store and artifact sink

pub mod backends;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod jobs;
pub mod peer;
pub mod security;

// Re-export commonly used types
pub use backends::{HttpChatBackend, build_backend_set};
pub use catalog::{CatalogError, ModelCatalog, ModelTarget, extract_models_from_html};
pub use clock::SystemClock;
pub use config::{BRIDGE_BACKEND, ConfigLoader, FileConfig};
pub use jobs::{FileArtifactSink, FileJobStore};
pub use peer::{
    CallEvent, IDLE_CHECK_INTERVAL, PeerCommand, RelayCall, RelayChatBackend, RelayError,
    RelaySettings, RelayState, spawn_idle_monitor,
};
pub use security::constant_time_eq;
