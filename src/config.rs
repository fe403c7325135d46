//! Configuration loading and snapshotting.
//!
//! A configuration is always a string-keyed mapping. Key order is preserved
//! from the source through the snapshot (`serde_json` is built with
//! `preserve_order`).

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::{Error, Result};

/// Resolved configuration mapping.
pub type Config = Map<String, Value>;

/// File name of the snapshot written under `artifacts/`.
pub const SNAPSHOT_FILE: &str = "config.yaml";

/// Where a configuration comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConfigSource {
    /// Empty configuration.
    #[default]
    None,
    /// In-memory mapping, copied as-is.
    Mapping(Config),
    /// JSON, YAML or TOML file, chosen by extension.
    File(PathBuf),
}

impl From<Config> for ConfigSource {
    fn from(map: Config) -> Self {
        Self::Mapping(map)
    }
}

impl From<PathBuf> for ConfigSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

impl ConfigSource {
    /// Build a source from a JSON value: objects become mappings, `null` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for any other value.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::None),
            Value::Object(map) => Ok(Self::Mapping(map)),
            other => Err(Error::InvalidConfiguration(format!(
                "config value must be a mapping, got {other}"
            ))),
        }
    }
}

/// Resolve a configuration source into a mapping.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] if the file is missing, cannot be
/// parsed, or does not contain a mapping at the top level.
pub fn load_config(source: &ConfigSource) -> Result<Config> {
    match source {
        ConfigSource::None => Ok(Map::new()),
        ConfigSource::Mapping(map) => Ok(map.clone()),
        ConfigSource::File(path) => load_config_file(path),
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    if !path.is_file() {
        return Err(Error::InvalidConfiguration(format!(
            "config file not found: {}",
            path.display()
        )));
    }
    let text = fs::read_to_string(path).map_err(|e| {
        Error::InvalidConfiguration(format!("failed to read config {}: {e}", path.display()))
    })?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let value = match ext.as_deref() {
        Some("yaml" | "yml") => parse_yaml(&text, path)?,
        Some("json") => serde_json::from_str::<Value>(&text).map_err(|e| {
            Error::InvalidConfiguration(format!("failed to parse JSON {}: {e}", path.display()))
        })?,
        Some("toml") => toml::from_str::<Value>(&text).map_err(|e| {
            Error::InvalidConfiguration(format!("failed to parse TOML {}: {e}", path.display()))
        })?,
        _ => match serde_json::from_str::<Value>(&text) {
            Ok(value @ Value::Object(_)) => value,
            _ => {
                debug!(path = %path.display(), "config is not a JSON object, trying YAML");
                parse_yaml(&text, path)?
            }
        },
    };

    into_mapping(value, path)
}

fn parse_yaml(text: &str, path: &Path) -> Result<Value> {
    let value: Option<Value> = serde_yaml::from_str(text).map_err(|e| {
        Error::InvalidConfiguration(format!("failed to parse YAML {}: {e}", path.display()))
    })?;
    // An empty YAML document is an empty mapping.
    Ok(value.unwrap_or_else(|| Value::Object(Map::new())))
}

fn into_mapping(value: Value, path: &Path) -> Result<Config> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(Error::InvalidConfiguration(format!(
            "config must map to an object: {}",
            path.display()
        ))),
    }
}

/// Write `config` to `dest` as YAML, falling back to pretty JSON if the
/// YAML serializer rejects it.
///
/// # Errors
///
/// Returns an IO error if the file cannot be written.
pub fn snapshot_config(config: &Config, dest: &Path) -> Result<()> {
    let text = match serde_yaml::to_string(config) {
        Ok(yaml) => yaml,
        Err(e) => {
            debug!(error = %e, "YAML snapshot failed, writing JSON");
            let mut json = serde_json::to_string_pretty(config)?;
            json.push('\n');
            json
        }
    };
    fs::write(dest, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(value: Value) -> Config {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_load_from_mapping() {
        let cfg = load_config(&ConfigSource::Mapping(mapping(json!({"lr": 0.001, "epochs": 10}))))
            .unwrap();
        assert_eq!(cfg["lr"], json!(0.001));
        assert_eq!(cfg["epochs"], json!(10));
    }

    #[test]
    fn test_load_none_is_empty() {
        assert!(load_config(&ConfigSource::None).unwrap().is_empty());
    }

    #[test]
    fn test_load_json_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"lr": 0.001, "epochs": 5}"#).unwrap();

        let cfg = load_config(&ConfigSource::File(path)).unwrap();
        assert_eq!(Value::Object(cfg), json!({"lr": 0.001, "epochs": 5}));
    }

    #[test]
    fn test_load_yaml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yml");
        fs::write(&path, "lr: 0.001\nmodel:\n  depth: 4\n").unwrap();

        let cfg = load_config(&ConfigSource::File(path)).unwrap();
        assert_eq!(cfg["model"]["depth"], json!(4));
    }

    #[test]
    fn test_load_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "lr = 0.5\n[data]\nname = \"mnist\"\n").unwrap();

        let cfg = load_config(&ConfigSource::File(path)).unwrap();
        assert_eq!(cfg["data"]["name"], json!("mnist"));
    }

    #[test]
    fn test_empty_yaml_is_empty_mapping() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.yaml");
        fs::write(&path, "").unwrap();
        assert!(load_config(&ConfigSource::File(path)).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_config(&ConfigSource::File(tmp.path().join("missing.yaml"))).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_non_mapping_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("list.yaml");
        fs::write(&path, "- a\n- b\n").unwrap();
        assert!(matches!(
            load_config(&ConfigSource::File(path)),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            ConfigSource::from_value(json!([1, 2])),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_snapshot_roundtrip_keeps_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join(SNAPSHOT_FILE);
        let cfg = mapping(json!({"zeta": 1, "alpha": {"b": 2, "a": 1}, "lr": 0.001}));

        snapshot_config(&cfg, &dest).unwrap();
        let loaded = load_config(&ConfigSource::File(dest)).unwrap();

        assert_eq!(loaded, cfg);
        let keys: Vec<&String> = loaded.keys().collect();
        assert_eq!(keys, ["zeta", "alpha", "lr"]);
    }
}
