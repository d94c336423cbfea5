//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Project-level file names, first match wins
const PROJECT_FILES: [&str; 2] = ["relay.toml", ".relay.toml"];

/// Ids captured from the browser, merged over the `[translator]` section
const CAPTURED_IDS_FILE: &str = ".relay/captured_ids.toml";

/// Environment variable prefix; `RELAY_SERVER__PORT=8080` sets `server.port`
const ENV_PREFIX: &str = "RELAY_";

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `RELAY_`-prefixed environment variables
    /// 2. Explicit config path (if provided)
    /// 3. Captured ids: `./.relay/captured_ids.toml`
    /// 4. Project root: `./relay.toml` or `./.relay.toml`
    /// 5. Global: `$XDG_CONFIG_HOME/arena-relay/config.toml`
    /// 6. Default values
    pub fn load(config_path: Option<&PathBuf>) -> Result<FileConfig, Box<figment::Error>> {
        Self::figment(config_path).extract().map_err(Box::new)
    }

    fn figment(config_path: Option<&PathBuf>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(&global_path));
        }

        if let Some(path) = Self::project_config_path() {
            figment = figment.merge(Toml::file(&path));
        }

        let captured = Self::captured_ids_path();
        if captured.exists() {
            figment = figment.merge(Toml::file(&captured));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    /// Get the global config file path
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("arena-relay").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    pub fn captured_ids_path() -> PathBuf {
        PathBuf::from(CAPTURED_IDS_FILE)
    }

    /// Persist captured ids so they survive restarts and reloads.
    pub fn save_captured_ids(path: &Path, session_id: &str, message_id: &str) -> io::Result<()> {
        let doc = CapturedIds {
            translator: CapturedTranslatorIds {
                session_id: session_id.to_string(),
                message_id: message_id.to_string(),
            },
        };
        let body = toml::to_string(&doc).map_err(io::Error::other)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)
    }

    /// Print the config file locations being used (for debugging)
    pub fn print_config_sources() {
        println!("Configuration sources (in priority order):");

        println!("  [ENV  ] {ENV_PREFIX}* environment variables");

        let captured = Self::captured_ids_path();
        if captured.exists() {
            println!("  [FOUND] Captured ids: {}", captured.display());
        } else {
            println!("  [     ] Captured ids: {}", captured.display());
        }

        if let Some(path) = Self::project_config_path() {
            println!("  [FOUND] Project: {}", path.display());
        } else {
            println!("  [     ] Project: ./relay.toml or ./.relay.toml");
        }

        if let Some(path) = Self::global_config_path() {
            if path.exists() {
                println!("  [FOUND] Global:  {}", path.display());
            } else {
                println!("  [     ] Global:  {}", path.display());
            }
        }

        println!("  [     ] Default: built-in defaults");
    }
}

#[derive(Serialize, Deserialize)]
struct CapturedIds {
    translator: CapturedTranslatorIds,
}

#[derive(Serialize, Deserialize)]
struct CapturedTranslatorIds {
    session_id: String,
    message_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert_eq!(config.server.max_channels, 200);
        assert!(config.translator.session_id.is_none());
    }

    #[test]
    fn test_global_config_path_names_app() {
        if let Some(path) = ConfigLoader::global_config_path() {
            assert!(path.to_string_lossy().contains("arena-relay"));
        }
    }

    #[test]
    fn test_explicit_file_and_captured_ids_merge() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("relay.toml");
        std::fs::write(
            &explicit,
            "[server]\nport = 7000\n\n[translator]\nbypass_enabled = true\n",
        )
        .unwrap();
        let captured = dir.path().join("ids").join("captured.toml");
        ConfigLoader::save_captured_ids(&captured, "sess-1", "msg-1").unwrap();

        let config: FileConfig = Figment::new()
            .merge(Serialized::defaults(FileConfig::default()))
            .merge(Toml::file(&explicit))
            .merge(Toml::file(&captured))
            .extract()
            .unwrap();

        assert_eq!(config.server.port, 7000);
        assert!(config.translator.bypass_enabled);
        assert_eq!(config.translator.session_id.as_deref(), Some("sess-1"));
        assert_eq!(config.translator.message_id.as_deref(), Some("msg-1"));
    }
}
