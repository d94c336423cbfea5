//! Model catalog backed by `models.json` and `model_endpoint_map.json`.
//!
//! Both files are optional. A missing or unparsable file leaves the
//! corresponding map empty and logs a warning; the gateway keeps serving.

use regex::Regex;
use relay_domain::EndpointEntry;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};
use thiserror::Error;
use tracing::{info, warn};

static MODELS_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)(\{.*?"models".*?\})"#).expect("valid models object regex"));

static JSON_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*type=["']application/json["'][^>]*>(.*?)</script>"#)
        .expect("valid json script regex")
});

/// Errors raised while rewriting catalog files
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where a model name routes upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelTarget {
    pub target_model_id: Option<String>,
    pub is_image: bool,
}

/// Model name to upstream id map plus per-model endpoint mappings.
pub struct ModelCatalog {
    models_path: PathBuf,
    endpoint_map_path: PathBuf,
    models: RwLock<BTreeMap<String, Value>>,
    endpoints: RwLock<BTreeMap<String, EndpointEntry>>,
}

impl ModelCatalog {
    /// Create a catalog and load both files.
    pub fn load(models_path: impl Into<PathBuf>, endpoint_map_path: impl Into<PathBuf>) -> Self {
        let catalog = Self {
            models_path: models_path.into(),
            endpoint_map_path: endpoint_map_path.into(),
            models: RwLock::new(BTreeMap::new()),
            endpoints: RwLock::new(BTreeMap::new()),
        };
        catalog.reload();
        catalog
    }

    /// Re-read both files from disk.
    pub fn reload(&self) {
        let models = read_models(&self.models_path);
        let endpoints = read_endpoints(&self.endpoint_map_path);
        info!(
            models = models.len(),
            endpoints = endpoints.len(),
            "Model catalog loaded"
        );
        *self.models.write().unwrap_or_else(|e| e.into_inner()) = models;
        *self.endpoints.write().unwrap_or_else(|e| e.into_inner()) = endpoints;
    }

    /// Upstream id and image flag for `model`.
    ///
    /// A string value is the id itself; an object may carry `id` and
    /// `"type": "image"`. Unknown models have no target id.
    pub fn target(&self, model: &str) -> ModelTarget {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        match models.get(model) {
            Some(Value::String(id)) => ModelTarget {
                target_model_id: Some(id.clone()),
                is_image: false,
            },
            Some(Value::Object(info)) => ModelTarget {
                target_model_id: info.get("id").and_then(Value::as_str).map(str::to_string),
                is_image: info.get("type").and_then(Value::as_str) == Some("image"),
            },
            _ => ModelTarget::default(),
        }
    }

    pub fn endpoint(&self, model: &str) -> Option<EndpointEntry> {
        self.endpoints
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(model)
            .cloned()
    }

    /// Known model names in sorted order.
    pub fn model_names(&self) -> Vec<String> {
        self.models
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Replace `models.json` with `models` and adopt it in memory.
    pub fn write_models(&self, models: Map<String, Value>) -> Result<usize, CatalogError> {
        let body = serde_json::to_string_pretty(&models)?;
        write_atomic(&self.models_path, &body)?;
        let count = models.len();
        *self.models.write().unwrap_or_else(|e| e.into_inner()) = models.into_iter().collect();
        info!(count, path = %self.models_path.display(), "Model list updated");
        Ok(count)
    }
}

/// Find the `models` object in a page source.
///
/// Inline `{..."models"...}` objects are tried first, then JSON script tags.
/// A list of names becomes `{name: name}`.
pub fn extract_models_from_html(html: &str) -> Option<Map<String, Value>> {
    let inline = MODELS_OBJECT
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim());
    let scripts = JSON_SCRIPT
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim());

    inline.chain(scripts).find_map(|candidate| {
        let parsed: Value = serde_json::from_str(candidate).ok()?;
        parsed.get("models").map(normalize_models)
    })
}

fn normalize_models(models: &Value) -> Map<String, Value> {
    match models {
        Value::Object(map) => map.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .map(|name| (name.to_string(), Value::String(name.to_string())))
            .collect(),
        _ => Map::new(),
    }
}

fn read_json(path: &Path) -> Option<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), "Catalog file unavailable: {e}. Using empty map.");
            return None;
        }
    };
    if content.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), "Failed to parse catalog file: {e}. Using empty map.");
            None
        }
    }
}

fn read_models(path: &Path) -> BTreeMap<String, Value> {
    match read_json(path) {
        Some(value @ (Value::Object(_) | Value::Array(_))) => {
            normalize_models(&value).into_iter().collect()
        }
        Some(_) => {
            warn!(path = %path.display(), "Model list is neither an object nor a list");
            BTreeMap::new()
        }
        None => BTreeMap::new(),
    }
}

fn read_endpoints(path: &Path) -> BTreeMap<String, EndpointEntry> {
    let Some(Value::Object(map)) = read_json(path) else {
        return BTreeMap::new();
    };
    map.into_iter()
        .filter_map(|(model, raw)| match serde_json::from_value(raw) {
            Ok(entry) => Some((model, entry)),
            Err(e) => {
                warn!(model = %model, "Skipping invalid endpoint mapping: {e}");
                None
            }
        })
        .collect()
}

pub(crate) fn write_atomic(path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_domain::ConversationMode;

    fn catalog_with(models: &str, endpoints: &str) -> (tempfile::TempDir, ModelCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let models_path = dir.path().join("models.json");
        let endpoints_path = dir.path().join("model_endpoint_map.json");
        std::fs::write(&models_path, models).unwrap();
        std::fs::write(&endpoints_path, endpoints).unwrap();
        let catalog = ModelCatalog::load(models_path, endpoints_path);
        (dir, catalog)
    }

    #[test]
    fn string_and_object_targets() {
        let (_dir, catalog) = catalog_with(
            r#"{"gpt-x": "id-1", "painter": {"id": "id-2", "type": "image"}}"#,
            "{}",
        );
        assert_eq!(
            catalog.target("gpt-x"),
            ModelTarget {
                target_model_id: Some("id-1".into()),
                is_image: false
            }
        );
        let painter = catalog.target("painter");
        assert_eq!(painter.target_model_id.as_deref(), Some("id-2"));
        assert!(painter.is_image);
        assert_eq!(catalog.target("unknown"), ModelTarget::default());
        assert_eq!(catalog.model_names(), vec!["gpt-x", "painter"]);
    }

    #[test]
    fn list_of_names_maps_to_itself() {
        let (_dir, catalog) = catalog_with(r#"["a", "b"]"#, "{}");
        assert_eq!(catalog.target("a").target_model_id.as_deref(), Some("a"));
    }

    #[test]
    fn missing_and_invalid_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ModelCatalog::load(dir.path().join("nope.json"), dir.path().join("x.json"));
        assert!(catalog.model_names().is_empty());

        let (_dir, catalog) = catalog_with("{not json", "[1, 2]");
        assert!(catalog.model_names().is_empty());
        assert!(catalog.endpoint("any").is_none());
    }

    #[test]
    fn endpoint_entries_single_and_list() {
        let (_dir, catalog) = catalog_with(
            "{}",
            r#"{
                "one": {"session_id": "s1", "message_id": "m1", "mode": "battle", "battle_target": "B"},
                "many": [{"session_id": "s2", "message_id": "m2"}, {"session_id": "s3", "message_id": "m3"}],
                "bad": 42
            }"#,
        );
        match catalog.endpoint("one") {
            Some(EndpointEntry::One(m)) => {
                assert_eq!(m.session_id.as_deref(), Some("s1"));
                assert_eq!(m.mode, Some(ConversationMode::Battle));
            }
            other => panic!("unexpected entry: {other:?}"),
        }
        assert!(matches!(catalog.endpoint("many"), Some(EndpointEntry::Many(list)) if list.len() == 2));
        assert!(catalog.endpoint("bad").is_none());
    }

    #[test]
    fn write_models_persists_and_reloads() {
        let (dir, catalog) = catalog_with("{}", "{}");
        let models = extract_models_from_html(r#"<div>{"models": ["m1", "m2"]}</div>"#).unwrap();
        assert_eq!(catalog.write_models(models).unwrap(), 2);
        assert_eq!(catalog.model_names(), vec!["m1", "m2"]);

        let reread = ModelCatalog::load(dir.path().join("models.json"), dir.path().join("x"));
        assert_eq!(reread.model_names(), vec!["m1", "m2"]);
    }

    #[test]
    fn extracts_from_json_script_tag() {
        let html = r#"<html><script type="application/json">{"page": 1, "models": {"alpha": "id-a"}}</script></html>"#;
        let models = extract_models_from_html(html).unwrap();
        assert_eq!(models.get("alpha"), Some(&Value::String("id-a".into())));
    }

    #[test]
    fn no_models_in_page() {
        assert!(extract_models_from_html("<html><body>nothing</body></html>").is_none());
    }
}
