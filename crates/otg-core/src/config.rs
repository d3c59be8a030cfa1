//! Target configuration loading and validation
//!
//! The configuration file is JSON:
//!
//! ```json
//! {
//!   "targets": {
//!     "otg-host:8443": {
//!       "ports": {
//!         "p1": { "location": "eth1", "name": "p1" }
//!       }
//!     }
//!   },
//!   "schema_path": "/opt/otg/schemas"
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

/// Target used when no configuration file is given
pub const DEFAULT_TARGET: &str = "localhost:8443";

const DEFAULT_PORT_LOCATION: &str = "localhost:5555";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON in configuration file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Loaded configuration
#[derive(Debug, Clone, Default, Serialize)]
pub struct Config {
    /// Targets keyed by `host:port`, in file order
    pub targets: IndexMap<String, TargetConfig>,
    /// Custom schema directory, only set when it exists on disk
    pub schema_path: Option<PathBuf>,
}

/// One traffic generator and its ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub ports: IndexMap<String, PortConfig>,
}

/// One port of a traffic generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPortConfig")]
pub struct PortConfig {
    pub location: Option<String>,
    pub name: Option<String>,
    /// Deprecated alias for `location`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

#[derive(Deserialize)]
struct RawPortConfig {
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    interface: Option<String>,
}

impl From<RawPortConfig> for PortConfig {
    fn from(raw: RawPortConfig) -> Self {
        let location = raw.location.or_else(|| raw.interface.clone());
        let name = raw
            .name
            .or_else(|| raw.interface.clone())
            .or_else(|| location.clone());

        Self {
            location,
            name,
            interface: raw.interface,
        }
    }
}

impl PortConfig {
    pub fn new(location: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            name: Some(name.into()),
            interface: None,
        }
    }
}

impl Config {
    /// Development configuration with a single local target
    pub fn development() -> Self {
        let mut ports = IndexMap::new();
        ports.insert("p1".to_string(), PortConfig::new(DEFAULT_PORT_LOCATION, "p1"));
        ports.insert("p2".to_string(), PortConfig::new(DEFAULT_PORT_LOCATION, "p2"));

        let mut targets = IndexMap::new();
        targets.insert(DEFAULT_TARGET.to_string(), TargetConfig { ports });

        Self {
            targets,
            schema_path: None,
        }
    }

    /// Parse configuration from JSON text
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let root: serde_json::Value = serde_json::from_str(content)?;

        let targets_value = root.get("targets").ok_or_else(|| {
            ConfigError::InvalidConfig(
                "Configuration file must contain a 'targets' property".to_string(),
            )
        })?;
        let raw_targets = targets_value.as_object().ok_or_else(|| {
            ConfigError::InvalidConfig("'targets' must be an object".to_string())
        })?;

        let mut targets = IndexMap::new();
        for (hostname, target_value) in raw_targets {
            let target: TargetConfig = serde_json::from_value(target_value.clone())
                .map_err(|e| {
                    error!(target = %hostname, error = %e, "Invalid target configuration");
                    ConfigError::InvalidConfig(format!(
                        "Invalid target configuration for '{}': {}",
                        hostname, e
                    ))
                })?;
            targets.insert(hostname.clone(), target);
        }

        let schema_path = match root.get("schema_path") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(path)) => {
                let path = PathBuf::from(path);
                if path.exists() {
                    info!(path = %path.display(), "Using custom schema path");
                    Some(path)
                } else {
                    warn!(path = %path.display(), "Specified schema path does not exist");
                    None
                }
            }
            Some(other) => {
                return Err(ConfigError::InvalidConfig(format!(
                    "'schema_path' must be a string, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            targets,
            schema_path,
        })
    }

    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.get(name)
    }
}

/// Load configuration from file, or the development default when `path` is `None`
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p,
        None => {
            info!(target = DEFAULT_TARGET, "No configuration file, using development target");
            return Ok(Config::development());
        }
    };

    info!(path = %path.display(), "Loading configuration");
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config = Config::from_json(&content)?;
    info!(targets = config.targets.len(), "Configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_development_default() {
        let config = load_config(None).unwrap();
        let target = config.target(DEFAULT_TARGET).unwrap();
        let names: Vec<_> = target.ports.keys().cloned().collect();
        assert_eq!(names, vec!["p1", "p2"]);
        assert_eq!(
            target.ports["p1"].location.as_deref(),
            Some(DEFAULT_PORT_LOCATION)
        );
        assert!(config.schema_path.is_none());
    }

    #[test]
    fn test_parse_targets_in_order() {
        let config = Config::from_json(
            r#"{"targets": {
                "b:8443": {"ports": {"p1": {"location": "eth1", "name": "p1"}}},
                "a:8443": {"ports": {}}
            }}"#,
        )
        .unwrap();
        let keys: Vec<_> = config.targets.keys().cloned().collect();
        assert_eq!(keys, vec!["b:8443", "a:8443"]);
    }

    #[test]
    fn test_port_fallbacks() {
        let config = Config::from_json(
            r#"{"targets": {"t:1": {"ports": {
                "legacy": {"interface": "eth2"},
                "loc": {"location": "eth3"},
                "full": {"location": "eth4", "name": "custom"}
            }}}}"#,
        )
        .unwrap();
        let ports = &config.targets["t:1"].ports;

        assert_eq!(ports["legacy"].location.as_deref(), Some("eth2"));
        assert_eq!(ports["legacy"].name.as_deref(), Some("eth2"));
        assert_eq!(ports["loc"].name.as_deref(), Some("eth3"));
        assert_eq!(ports["full"].name.as_deref(), Some("custom"));
    }

    #[test]
    fn test_api_version_key_rejected() {
        let err = Config::from_json(
            r#"{"targets": {"t:1": {"ports": {}, "apiVersion": "1.30.0"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));
        assert!(err.to_string().contains("apiVersion"));
    }

    #[test]
    fn test_missing_targets_and_ports() {
        let err = Config::from_json(r#"{"schema_path": null}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));

        let err = Config::from_json(r#"{"targets": {"t:1": {}}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_config(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_schema_path_must_exist() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().display().to_string();
        let config_path = dir.path().join("config.json");

        let content = serde_json::json!({
            "targets": {},
            "schema_path": existing,
        });
        std::fs::write(&config_path, content.to_string()).unwrap();
        let config = load_config(Some(&config_path)).unwrap();
        assert_eq!(config.schema_path.as_deref(), Some(dir.path()));

        let content = serde_json::json!({
            "targets": {},
            "schema_path": dir.path().join("missing").display().to_string(),
        });
        std::fs::write(&config_path, content.to_string()).unwrap();
        let config = load_config(Some(&config_path)).unwrap();
        assert!(config.schema_path.is_none());
    }
}
