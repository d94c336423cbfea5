//! Configuration file loading for arena-relay
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `RELAY_`-prefixed environment variables
//! 2. `--config <path>` specified file
//! 3. Captured ids: `./.relay/captured_ids.toml`
//! 4. Project root: `./relay.toml` or `./.relay.toml`
//! 5. Global: `$XDG_CONFIG_HOME/arena-relay/config.toml`
//! 6. Default values

mod file_config;
mod loader;

pub use file_config::{
    BRIDGE_BACKEND, FileAdminConfig, FileBackendConfig, FileChallengeConfig, FileConfig,
    FileJobsConfig, FileRateLimitConfig, FileSchedulerConfig, FileServerConfig,
    FileTranslatorConfig,
};
pub use loader::ConfigLoader;
