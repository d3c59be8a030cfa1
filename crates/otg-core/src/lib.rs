//! OTG Core - Core types, schema registry, and target configuration
//!
//! This crate provides the foundational types for the OTG adapter:
//! - Version tuples and normalization for schema version matching
//! - Schema registry over built-in and custom OpenAPI documents
//! - Target configuration loading and validation
//! - Structured response models returned by every public operation

pub mod config;
pub mod models;
pub mod schema;
pub mod version;

pub use config::{load_config, Config, ConfigError, PortConfig, TargetConfig, DEFAULT_TARGET};
pub use models::{
    AvailableTargets, CapabilitiesVersion, CaptureJob, CaptureResponse, ConfigResponse,
    ControlResponse, HealthStatus, MetricsResponse, SchemaNamesResponse, SchemasResponse, Status,
    TargetAvailability, TargetHealthInfo, VersionResponse,
};
pub use schema::{SchemaError, SchemaRegistry, SCHEMAS_ROOT, SCHEMA_FILE_NAME};
pub use version::{denormalize_version, normalize_version, VersionTuple};
