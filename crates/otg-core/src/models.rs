//! Structured results returned by the public operation surface
//!
//! Every response carries a [`Status`]. Failures are reported in the
//! response body instead of being returned as errors.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::config::PortConfig;

/// Outcome of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

fn error_body(message: &str) -> Value {
    json!({ "error": message })
}

/// Version report served at `/capabilities/version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitiesVersion {
    pub api_spec_version: String,
    pub sdk_version: String,
    pub app_version: String,
}

/// A capture written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureJob {
    pub port: String,
    pub file_name: String,
    pub file_path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl ConfigResponse {
    pub fn success(config: Value) -> Self {
        Self {
            status: Status::Success,
            config: Some(config),
        }
    }

    pub fn error(message: impl AsRef<str>) -> Self {
        Self {
            status: Status::Error,
            config: Some(error_body(message.as_ref())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
}

impl MetricsResponse {
    pub fn success(metrics: Value) -> Self {
        Self {
            status: Status::Success,
            metrics: Some(metrics),
        }
    }

    pub fn error(message: impl AsRef<str>) -> Self {
        Self {
            status: Status::Error,
            metrics: Some(error_body(message.as_ref())),
        }
    }
}

/// Result of a traffic control action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status: Status,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Name of the strategy that performed the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

impl ControlResponse {
    pub fn success(action: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            action: action.into(),
            verified: None,
            timestamp: Utc::now(),
            result: None,
            strategy: None,
        }
    }

    pub fn error(action: impl Into<String>, message: impl AsRef<str>) -> Self {
        Self {
            status: Status::Error,
            action: action.into(),
            verified: None,
            timestamp: Utc::now(),
            result: Some(error_body(message.as_ref())),
            strategy: None,
        }
    }

    /// Record the verification outcome, mirrored into `result`
    pub fn with_verified(mut self, verified: bool) -> Self {
        self.verified = Some(verified);
        self.result = Some(json!({ "verified": verified }));
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }
}

/// Result of a capture action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub status: Status,
    /// First requested port, or the retrieved port
    pub port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl CaptureResponse {
    pub fn success(port: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            port: port.into(),
            data: None,
            capture_id: None,
            file_path: None,
            size_bytes: None,
            warnings: Vec::new(),
        }
    }

    pub fn error(port: impl Into<String>, message: impl AsRef<str>) -> Self {
        Self {
            status: Status::Error,
            data: Some(error_body(message.as_ref())),
            ..Self::success(port)
        }
    }

    /// Successful retrieval of a capture file
    pub fn captured(job: CaptureJob) -> Self {
        Self {
            status: Status::Success,
            data: Some(json!({
                "status": "captured",
                "file_path": job.file_path,
            })),
            capture_id: Some(job.file_name),
            size_bytes: Some(job.size_bytes),
            file_path: Some(job.file_path),
            port: job.port,
            warnings: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Health of one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetHealthInfo {
    pub name: String,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_info: Option<CapabilitiesVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health of a set of targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: Status,
    /// Records in the order the targets were requested
    pub targets: IndexMap<String, TargetHealthInfo>,
}

impl HealthStatus {
    /// Aggregate per-target records; success only when all of a non-empty set are healthy
    pub fn from_records(records: impl IntoIterator<Item = TargetHealthInfo>) -> Self {
        let targets: IndexMap<String, TargetHealthInfo> = records
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect();

        let all_healthy = !targets.is_empty() && targets.values().all(|info| info.healthy);
        Self {
            status: if all_healthy {
                Status::Success
            } else {
                Status::Error
            },
            targets,
        }
    }
}

/// Availability view of one configured target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAvailability {
    pub ports: IndexMap<String, PortConfig>,
    pub available: bool,
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(rename = "apiVersionError", default, skip_serializing_if = "Option::is_none")]
    pub api_version_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableTargets {
    pub status: Status,
    pub targets: IndexMap<String, TargetAvailability>,
}

/// Version report of a single target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub status: Status,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<CapabilitiesVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Schema documents or components resolved for a target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemasResponse {
    pub status: Status,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Requested name to component, or `{"error": ...}` for failed lookups
    #[serde(default)]
    pub schemas: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Names found in a target's schema document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaNamesResponse {
    pub status: Status,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
