//! Operation surface
//!
//! Every public operation returns a structured response with a status
//! field. Errors are logged and folded into the response body.

use indexmap::IndexMap;
use otg_core::{
    denormalize_version, AvailableTargets, CapabilitiesVersion, CaptureResponse, Config,
    ConfigResponse, ControlResponse, HealthStatus, MetricsResponse, SchemaNamesResponse,
    SchemaRegistry, SchemasResponse, Status, TargetAvailability, VersionResponse, SCHEMAS_ROOT,
};
use otg_device::{CaptureAction, Connector, DeviceApi, DeviceError, Metrics, MetricsRequest};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::{ClientCache, TargetDirectory};
use crate::capture::{self, CaptureOptions};
use crate::error::ControlError;
use crate::health::HealthMonitor;
use crate::traffic;
use crate::verify::VerifyOptions;

/// Target used by operations called without one
pub const DEFAULT_LOCAL_TARGET: &str = "localhost";

const TRAFFIC_ACTION: &str = "traffic_generation";

fn target_or_default(target: Option<&str>) -> &str {
    target.unwrap_or(DEFAULT_LOCAL_TARGET)
}

/// Client for OTG traffic generators
#[derive(Debug)]
pub struct OtgClient {
    directory: TargetDirectory,
    registry: Arc<SchemaRegistry>,
    cache: ClientCache,
    health: HealthMonitor,
    verify: VerifyOptions,
}

impl OtgClient {
    pub fn new(config: &Config, registry: Arc<SchemaRegistry>, connector: Arc<dyn Connector>) -> Self {
        info!(targets = config.targets.len(), "Initializing OTG client");
        Self {
            directory: TargetDirectory::from_config(config),
            registry,
            cache: ClientCache::new(connector.clone()),
            health: HealthMonitor::new(connector),
            verify: VerifyOptions::default(),
        }
    }

    pub fn with_verify_options(mut self, verify: VerifyOptions) -> Self {
        self.verify = verify;
        self
    }

    pub fn directory(&self) -> &TargetDirectory {
        &self.directory
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    async fn client(&self, target: &str) -> Result<Arc<dyn DeviceApi>, ControlError> {
        self.cache.get_client(target).await
    }

    /// Version report of `target`
    async fn version(&self, target: &str) -> Result<CapabilitiesVersion, ControlError> {
        self.cache
            .connector()
            .version(target)
            .await
            .map_err(|e| ControlError::from_connect(target, e))
    }

    /// API version to use for `target`'s schemas, in dotted form
    ///
    /// The reported SDK version is used when a schema exists for it, else the
    /// closest available one. Without a version report the latest schema wins.
    pub async fn resolve_api_version(&self, target: &str) -> Result<String, ControlError> {
        match self.version(target).await {
            Ok(version) => {
                let reported = version.sdk_version;
                if self.registry.schema_exists(&reported) {
                    info!(target = %target, version = %reported, "Found exact schema for reported version");
                    return Ok(denormalize_version(&reported));
                }

                let closest = denormalize_version(&self.registry.find_closest_schema_version(&reported)?);
                info!(
                    target = %target,
                    reported = %reported,
                    version = %closest,
                    "Using closest matching schema version"
                );
                Ok(closest)
            }
            Err(e) => {
                let latest = denormalize_version(&self.registry.latest_schema_version()?);
                warn!(
                    target = %target,
                    error = %e,
                    version = %latest,
                    "Version report failed, using latest schema version"
                );
                Ok(latest)
            }
        }
    }

    /// Reachability and effective API version of every configured target
    ///
    /// Clears the client cache first so a restarted device is rediscovered.
    pub async fn get_available_targets(&self) -> AvailableTargets {
        info!("Getting available traffic generator targets");
        self.cache.clear();

        let mut targets = IndexMap::new();
        for (name, target) in self.directory.iter() {
            let mut availability = TargetAvailability {
                ports: target.ports.clone(),
                available: false,
                api_version: None,
                api_version_error: None,
                error: None,
            };

            match self.client(name).await {
                Ok(_) => {
                    availability.available = true;
                    match self.resolve_api_version(name).await {
                        Ok(version) => availability.api_version = Some(version),
                        Err(e) => {
                            warn!(target = %name, error = %e, "Could not determine API version");
                            availability.api_version_error = Some(e.to_string());
                        }
                    }
                }
                Err(e) => {
                    warn!(target = %name, error = %e, "Target unavailable");
                    availability.error = Some(e.to_string());
                }
            }

            targets.insert(name.to_string(), availability);
        }

        info!(
            targets = targets.len(),
            available = targets.values().filter(|t| t.available).count(),
            "Target availability checked"
        );
        AvailableTargets {
            status: Status::Success,
            targets,
        }
    }

    pub async fn get_config(&self, target: Option<&str>) -> ConfigResponse {
        let target = target_or_default(target);
        info!(target = %target, "Getting configuration");

        let result = async {
            let device = self.client(target).await?;
            Ok::<_, ControlError>(device.get_config().await?)
        }
        .await;

        match result {
            Ok(config) => ConfigResponse::success(config),
            Err(e) => {
                error!(target = %target, error = %e, "Error getting configuration");
                ConfigResponse::error(e.to_string())
            }
        }
    }

    /// Apply a configuration, then read back what the device applied
    pub async fn set_config(&self, config: &Value, target: Option<&str>) -> ConfigResponse {
        let target = target_or_default(target);
        info!(target = %target, "Setting configuration");

        let result = async {
            let device = self.client(target).await?;
            let reply = device.set_config(config).await?;
            for warning in &reply.warnings {
                warn!(target = %target, warning = %warning, "Device warning");
            }
            Ok::<_, ControlError>(device.get_config().await?)
        }
        .await;

        match result {
            Ok(applied) => ConfigResponse::success(applied),
            Err(e) => {
                error!(target = %target, error = %e, "Error setting configuration");
                ConfigResponse::error(e.to_string())
            }
        }
    }

    pub async fn start_traffic(&self, target: Option<&str>) -> ControlResponse {
        let target = target_or_default(target);
        info!(target = %target, "Starting traffic");

        let result = async {
            let device = self.client(target).await?;
            traffic::start_traffic(device.as_ref()).await
        }
        .await;

        match result {
            Ok(outcome) => ControlResponse::success(TRAFFIC_ACTION).with_strategy(outcome.strategy),
            Err(e) => {
                error!(target = %target, error = %e, "Error starting traffic");
                ControlResponse::error(TRAFFIC_ACTION, e.to_string())
            }
        }
    }

    pub async fn stop_traffic(&self, target: Option<&str>) -> ControlResponse {
        self.stop_traffic_with_cancel(target, CancellationToken::new())
            .await
    }

    /// Stop traffic; cancelling `cancel` ends verification early as unverified
    pub async fn stop_traffic_with_cancel(
        &self,
        target: Option<&str>,
        cancel: CancellationToken,
    ) -> ControlResponse {
        let target = target_or_default(target);
        info!(target = %target, "Stopping traffic");

        let result = async {
            let device = self.client(target).await?;
            traffic::stop_traffic(device, self.verify, cancel).await
        }
        .await;

        match result {
            Ok(outcome) => ControlResponse::success(TRAFFIC_ACTION)
                .with_verified(outcome.verified)
                .with_strategy(outcome.strategy),
            Err(e) => {
                error!(target = %target, error = %e, "Error stopping traffic");
                ControlResponse::error(TRAFFIC_ACTION, e.to_string())
            }
        }
    }

    pub async fn start_capture(&self, ports: &[String], target: Option<&str>) -> CaptureResponse {
        self.set_capture(CaptureAction::Start, ports, target).await
    }

    pub async fn stop_capture(&self, ports: &[String], target: Option<&str>) -> CaptureResponse {
        self.set_capture(CaptureAction::Stop, ports, target).await
    }

    async fn set_capture(
        &self,
        action: CaptureAction,
        ports: &[String],
        target: Option<&str>,
    ) -> CaptureResponse {
        let target = target_or_default(target);
        let response_port = ports.first().cloned().unwrap_or_default();
        info!(target = %target, ports = ?ports, action = action.as_str(), "Setting capture state");

        let result = async {
            let device = self.client(target).await?;
            capture::set_capture(device.as_ref(), action, ports).await
        }
        .await;

        match result {
            Ok(outcome) => {
                let state = match action {
                    CaptureAction::Start => "started",
                    CaptureAction::Stop => "stopped",
                };
                CaptureResponse::success(response_port)
                    .with_data(json!({ "status": state, "strategy": outcome.strategy }))
                    .with_warnings(outcome.output)
            }
            Err(e) => {
                error!(target = %target, error = %e, action = action.as_str(), "Error setting capture state");
                CaptureResponse::error(response_port, e.to_string())
            }
        }
    }

    /// Retrieve a capture into `output_dir` (default: OS temp dir)
    pub async fn get_capture(
        &self,
        port: &str,
        target: Option<&str>,
        output_dir: Option<PathBuf>,
        filename: Option<String>,
    ) -> CaptureResponse {
        let target = target_or_default(target);
        info!(target = %target, port = %port, "Getting capture");
        let options = CaptureOptions {
            output_dir,
            filename,
        };

        let result = async {
            let device = self.client(target).await?;
            capture::retrieve_capture(device.as_ref(), port, &options).await
        }
        .await;

        match result {
            Ok(outcome) => CaptureResponse::captured(outcome.output),
            Err(e) => {
                error!(target = %target, port = %port, error = %e, "Error getting capture");
                CaptureResponse::error(port, e.to_string())
            }
        }
    }

    /// Fetch metrics
    ///
    /// `None` leaves a kind out, an empty list selects all of that kind, and
    /// passing neither fetches all port and flow metrics.
    pub async fn get_metrics(
        &self,
        flow_names: Option<Vec<String>>,
        port_names: Option<Vec<String>>,
        target: Option<&str>,
    ) -> MetricsResponse {
        let target = target_or_default(target);
        info!(target = %target, flows = ?flow_names, ports = ?port_names, "Getting metrics");

        let requests = match (port_names, flow_names) {
            (None, None) => vec![MetricsRequest::all_ports(), MetricsRequest::all_flows()],
            (ports, flows) => ports
                .map(MetricsRequest::Port)
                .into_iter()
                .chain(flows.map(MetricsRequest::Flow))
                .collect(),
        };

        let result = async {
            let device = self.client(target).await?;
            let mut metrics = Metrics::default();
            for request in &requests {
                metrics.merge(device.get_metrics(request).await?);
            }
            serde_json::to_value(metrics)
                .map_err(|e| ControlError::from(DeviceError::Decode(e.to_string())))
        }
        .await;

        match result {
            Ok(metrics) => MetricsResponse::success(metrics),
            Err(e) => {
                error!(target = %target, error = %e, "Error getting metrics");
                MetricsResponse::error(e.to_string())
            }
        }
    }

    /// Health of one target, or of every configured target
    pub async fn health(&self, target: Option<&str>) -> HealthStatus {
        match target {
            Some(target) => {
                info!(target = %target, "Checking health");
                self.health.check_all([target]).await
            }
            None => {
                info!(targets = self.directory.len(), "Checking health of all targets");
                self.health.check_all(self.directory.names()).await
            }
        }
    }

    pub async fn get_target_version(&self, target: &str) -> VersionResponse {
        info!(target = %target, "Getting version information");
        match self.version(target).await {
            Ok(version) => VersionResponse {
                status: Status::Success,
                target: target.to_string(),
                version: Some(version),
                error: None,
            },
            Err(e) => {
                error!(target = %target, error = %e, "Error getting version");
                VersionResponse {
                    status: Status::Error,
                    target: target.to_string(),
                    version: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Resolve the schema version of a configured target
    async fn target_schema_version(&self, target: &str) -> Result<String, ControlError> {
        if !self.directory.contains(target) {
            return Err(ControlError::UnknownTarget(target.to_string()));
        }
        self.resolve_api_version(target).await
    }

    /// Look up schema components for a target's API version
    ///
    /// Bare names are looked up under `components.schemas`. A failed lookup
    /// yields `{"error": ...}` for that name without failing the others.
    pub async fn get_schemas_for_target(&self, target: &str, names: &[String]) -> SchemasResponse {
        info!(target = %target, names = ?names, "Getting schemas for target");

        let api_version = match self.target_schema_version(target).await {
            Ok(version) => version,
            Err(e) => {
                error!(target = %target, error = %e, "Error resolving schema version");
                return SchemasResponse {
                    status: Status::Error,
                    target: target.to_string(),
                    api_version: None,
                    schemas: IndexMap::new(),
                    error: Some(e.to_string()),
                };
            }
        };

        let root_prefix = format!("{}.", SCHEMAS_ROOT);
        let mut schemas = IndexMap::new();
        for name in names {
            let path = if name.starts_with(&root_prefix) {
                name.clone()
            } else {
                format!("{}{}", root_prefix, name)
            };

            let value = match self.registry.get_schema(&api_version, Some(&path)) {
                Ok(value) => value,
                Err(e) => {
                    warn!(target = %target, schema = %name, error = %e, "Error retrieving schema");
                    json!({ "error": e.to_string() })
                }
            };
            schemas.insert(name.clone(), value);
        }

        SchemasResponse {
            status: Status::Success,
            target: target.to_string(),
            api_version: Some(api_version),
            schemas,
            error: None,
        }
    }

    /// Names under `components.schemas` for a target's API version
    pub async fn list_schemas_for_target(&self, target: &str) -> SchemaNamesResponse {
        info!(target = %target, "Listing schemas for target");

        let result = async {
            let api_version = self.target_schema_version(target).await?;
            let document = self.registry.get_schema(&api_version, None)?;
            let names: Vec<String> = document
                .get("components")
                .and_then(|c| c.get("schemas"))
                .and_then(Value::as_object)
                .map(|schemas| schemas.keys().cloned().collect())
                .unwrap_or_default();
            Ok::<_, ControlError>((api_version, names))
        }
        .await;

        names_response(target, result)
    }

    /// Keys of the map at `path_prefix` for a target's API version
    pub async fn get_schema_components_for_target(
        &self,
        target: &str,
        path_prefix: Option<&str>,
    ) -> SchemaNamesResponse {
        let path_prefix = path_prefix.unwrap_or(SCHEMAS_ROOT);
        info!(target = %target, prefix = %path_prefix, "Getting schema components for target");

        let result = async {
            let api_version = self.target_schema_version(target).await?;
            let names = self.registry.schema_components(&api_version, path_prefix)?;
            Ok::<_, ControlError>((api_version, names))
        }
        .await;

        names_response(target, result)
    }
}

fn names_response(
    target: &str,
    result: Result<(String, Vec<String>), ControlError>,
) -> SchemaNamesResponse {
    match result {
        Ok((api_version, names)) => SchemaNamesResponse {
            status: Status::Success,
            target: target.to_string(),
            api_version: Some(api_version),
            names,
            error: None,
        },
        Err(e) => {
            error!(target = %target, error = %e, "Error reading schema names");
            SchemaNamesResponse {
                status: Status::Error,
                target: target.to_string(),
                api_version: None,
                names: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}
