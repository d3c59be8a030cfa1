//! OpenAPI schema registry - Maps device API versions to schema documents
//!
//! Schema documents live in version-named directories (`1_30_0/openapi.yaml`)
//! under a built-in directory and an optional custom directory. Custom
//! directories take precedence when both provide the same version.
//!
//! Documents are parsed once and cached; cached documents are never mutated.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::version::{normalize_version, VersionTuple};

/// File that marks a version directory as holding a schema
pub const SCHEMA_FILE_NAME: &str = "openapi.yaml";

/// Path prefix whose remainder is looked up as a single key
pub const SCHEMAS_ROOT: &str = "components.schemas";

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema version {0} not found")]
    SchemaNotFound(String),
    #[error("{message}")]
    ComponentNotFound { path: String, message: String },
    #[error("No valid schema versions available")]
    NoSchemasAvailable,
    #[error("Error loading schema {version} from {path}: {message}")]
    Load {
        version: String,
        path: PathBuf,
        message: String,
    },
}

impl SchemaError {
    fn component(path: &str, message: impl Into<String>) -> Self {
        Self::ComponentNotFound {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Registry of OTG OpenAPI schema documents
#[derive(Debug)]
pub struct SchemaRegistry {
    builtin_dir: PathBuf,
    custom_dir: Option<PathBuf>,
    /// Normalized versions, custom directory first
    available: OnceLock<Vec<String>>,
    /// Loaded documents keyed by normalized version
    documents: RwLock<HashMap<String, Arc<Value>>>,
}

impl SchemaRegistry {
    /// Create a registry over a built-in directory and an optional custom one
    pub fn new(builtin_dir: impl Into<PathBuf>, custom_dir: Option<PathBuf>) -> Self {
        let builtin_dir = builtin_dir.into();
        info!(builtin = %builtin_dir.display(), "Schema registry initialized");
        if let Some(custom) = &custom_dir {
            info!(custom = %custom.display(), "Using custom schemas directory");
        }

        Self {
            builtin_dir,
            custom_dir,
            available: OnceLock::new(),
            documents: RwLock::new(HashMap::new()),
        }
    }

    pub fn builtin_dir(&self) -> &Path {
        &self.builtin_dir
    }

    pub fn custom_dir(&self) -> Option<&Path> {
        self.custom_dir.as_deref()
    }

    /// List normalized schema versions available on disk
    ///
    /// The directory scan happens once; later calls return the cached list.
    pub fn available_versions(&self) -> &[String] {
        self.available.get_or_init(|| {
            let mut versions = Vec::new();

            if let Some(custom) = &self.custom_dir {
                let custom_versions = scan_schema_dir(custom);
                info!(count = custom_versions.len(), "Found schemas in custom directory");
                versions.extend(custom_versions);
            }

            let builtin_versions = scan_schema_dir(&self.builtin_dir);
            info!(count = builtin_versions.len(), "Found schemas in built-in directory");
            for version in builtin_versions {
                if !versions.contains(&version) {
                    versions.push(version);
                }
            }

            info!(total = versions.len(), "Total available schemas");
            versions
        })
    }

    /// Check whether a schema exists for a version (dotted or underscored)
    pub fn schema_exists(&self, version: &str) -> bool {
        let normalized = normalize_version(version);
        debug!(version = %version, normalized = %normalized, "Checking if schema exists");
        self.available_versions().contains(&normalized)
    }

    /// Get the full schema document for a version, loading it on first use
    pub fn document(&self, version: &str) -> Result<Arc<Value>, SchemaError> {
        let normalized = normalize_version(version);

        if !self.schema_exists(&normalized) {
            error!(version = %version, "Schema version not found");
            return Err(SchemaError::SchemaNotFound(version.to_string()));
        }

        if let Some(doc) = self.documents.read().get(&normalized) {
            return Ok(doc.clone());
        }

        let doc = Arc::new(self.load_document(&normalized)?);

        // A concurrent loader may have won; keep the first cached copy
        let mut documents = self.documents.write();
        let cached = documents.entry(normalized).or_insert(doc);
        Ok(cached.clone())
    }

    fn load_document(&self, normalized: &str) -> Result<Value, SchemaError> {
        if let Some(custom) = &self.custom_dir {
            let path = custom.join(normalized).join(SCHEMA_FILE_NAME);
            if path.exists() {
                match load_schema_file(&path, normalized) {
                    Ok(doc) => {
                        info!(path = %path.display(), "Loaded schema from custom path");
                        return Ok(doc);
                    }
                    Err(e) => warn!(error = %e, "Falling back to built-in schema"),
                }
            }
        }

        let path = self.builtin_dir.join(normalized).join(SCHEMA_FILE_NAME);
        let doc = load_schema_file(&path, normalized)?;
        info!(path = %path.display(), "Loaded schema from built-in path");
        Ok(doc)
    }

    /// Get a schema document, or a component within it
    ///
    /// A component path starting with `components.schemas.` names a single
    /// entry of that map; its remainder is used verbatim as the key, dots
    /// included. Any other path is walked one dot-separated segment at a time.
    pub fn get_schema(&self, version: &str, component: Option<&str>) -> Result<Value, SchemaError> {
        info!(version = %version, component = component.unwrap_or("all"), "Getting schema");
        let doc = self.document(version)?;

        let component = match component {
            Some(c) if !c.is_empty() => c,
            _ => return Ok(doc.as_ref().clone()),
        };

        let root_prefix = format!("{}.", SCHEMAS_ROOT);
        if let Some(schema_name) = component.strip_prefix(&root_prefix) {
            debug!(schema = %schema_name, "Looking up schema under components.schemas");
            let schemas = doc
                .get("components")
                .and_then(|c| c.get("schemas"))
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    SchemaError::component(component, "Error accessing components.schemas")
                })?;

            return schemas.get(schema_name).cloned().ok_or_else(|| {
                SchemaError::component(
                    component,
                    format!("Schema {} not found in components.schemas", schema_name),
                )
            });
        }

        let mut node = doc.as_ref();
        for segment in component.split('.') {
            node = match node.as_object().and_then(|map| map.get(segment)) {
                Some(child) => child,
                None => {
                    return Err(SchemaError::component(
                        component,
                        format!("Component {} not found in path {}", segment, component),
                    ))
                }
            };
        }

        debug!(component = %component, "Retrieved component");
        Ok(node.clone())
    }

    /// List the top-level keys of a schema document
    pub fn list_schemas(&self, version: &str) -> Result<Vec<String>, SchemaError> {
        let doc = self.document(version)?;
        Ok(doc
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// List the keys of the map found at `path_prefix`
    ///
    /// Returns an empty list when the node exists but is not a map.
    pub fn schema_components(
        &self,
        version: &str,
        path_prefix: &str,
    ) -> Result<Vec<String>, SchemaError> {
        let component = self.get_schema(version, Some(path_prefix))?;
        match component.as_object() {
            Some(map) => Ok(map.keys().cloned().collect()),
            None => {
                warn!(path = %path_prefix, "Component is not a map");
                Ok(Vec::new())
            }
        }
    }

    /// Find the closest available schema version to `requested`
    ///
    /// Matching order:
    /// 1. Exact match after normalization
    /// 2. Unparseable request: latest available version
    /// 3. Same major.minor with equal or lower patch (highest wins)
    /// 4. Same major (highest wins)
    /// 5. Latest available version
    pub fn find_closest_schema_version(&self, requested: &str) -> Result<String, SchemaError> {
        info!(requested = %requested, "Finding closest schema version");
        let available = self.available_versions();
        if available.is_empty() {
            error!("No schema versions available");
            return Err(SchemaError::NoSchemasAvailable);
        }

        let normalized = normalize_version(requested);
        if available.contains(&normalized) {
            info!(version = %normalized, "Found exact schema match");
            return Ok(normalized);
        }

        let requested_tuple = match VersionTuple::parse(requested) {
            Some(t) => t.padded(3),
            None => {
                debug!("Unable to parse version, returning latest schema version");
                return self.latest_schema_version();
            }
        };

        let parsed = parsed_versions(available);
        if parsed.is_empty() {
            error!("No valid schema versions available");
            return Err(SchemaError::NoSchemasAvailable);
        }

        let (req_major, req_minor, req_patch) = (
            requested_tuple.major(),
            requested_tuple.minor(),
            requested_tuple.patch(),
        );

        let same_major_minor = highest(parsed.iter().filter(|(_, v)| {
            v.len() >= 3
                && v.major() == req_major
                && v.minor() == req_minor
                && v.patch() <= req_patch
        }));
        if let Some(version) = same_major_minor {
            info!(version = %version, "Using version with same major.minor");
            return Ok(version);
        }

        let same_major = highest(parsed.iter().filter(|(_, v)| v.major() == req_major));
        if let Some(version) = same_major {
            info!(version = %version, "Using version with same major");
            return Ok(version);
        }

        let latest = highest(parsed.iter()).ok_or(SchemaError::NoSchemasAvailable)?;
        info!(version = %latest, "No matching version found, falling back to latest");
        Ok(latest)
    }

    /// Get the latest available schema version
    pub fn latest_schema_version(&self) -> Result<String, SchemaError> {
        let available = self.available_versions();
        if available.is_empty() {
            error!("No schema versions available");
            return Err(SchemaError::NoSchemasAvailable);
        }

        let latest = highest(parsed_versions(available).iter())
            .ok_or(SchemaError::NoSchemasAvailable)?;
        info!(version = %latest, "Latest available schema version");
        Ok(latest)
    }
}

/// List version directories in `dir` that contain a schema file
fn scan_schema_dir(dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Schema directory not readable");
            return Vec::new();
        }
    };

    let mut versions: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().join(SCHEMA_FILE_NAME).is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    versions.sort();
    versions
}

fn load_schema_file(path: &Path, version: &str) -> Result<Value, SchemaError> {
    let load_error = |message: String| SchemaError::Load {
        version: version.to_string(),
        path: path.to_path_buf(),
        message,
    };

    let content = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
    // Going through serde_yaml::Value keeps non-string keys such as response codes
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| load_error(e.to_string()))?;
    serde_json::to_value(yaml).map_err(|e| load_error(e.to_string()))
}

fn parsed_versions(available: &[String]) -> Vec<(String, VersionTuple)> {
    available
        .iter()
        .filter_map(|v| VersionTuple::parse(v).map(|t| (v.clone(), t)))
        .collect()
}

fn highest<'a>(candidates: impl Iterator<Item = &'a (String, VersionTuple)>) -> Option<String> {
    candidates
        .max_by(|a, b| a.1.cmp(&b.1))
        .map(|(version, _)| version.clone())
}
