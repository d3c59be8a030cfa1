//! HTTP implementation of the device protocol
//!
//! Devices serve JSON over HTTPS with self-signed certificates, so
//! certificate verification is disabled for device traffic.

use async_trait::async_trait;
use otg_core::CapabilitiesVersion;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::api::{location_for_target, Connector, DeviceApi, DeviceError};
use crate::capability::CapabilityDescriptor;
use crate::metrics::{Metrics, MetricsRequest};
use crate::state::{
    CaptureRequest, CaptureStateRequest, ControlState, ControlStateResponse, TrafficState,
    TransmitStateRequest,
};

/// Per-request timeout for device calls
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const VERSION_PATH: &str = "/capabilities/version";

/// Builds [`HttpDevice`] handles
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Result<Self, DeviceError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .map_err(DeviceError::Transport)?;

        Ok(Self { client })
    }

    async fn fetch_version(&self, location: &str) -> Result<CapabilitiesVersion, DeviceError> {
        let url = format!("{}{}", location, VERSION_PATH);
        debug!(url = %url, "Requesting version report");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(DeviceError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let version: CapabilitiesVersion = response.json().await?;
        debug!(
            api_spec_version = %version.api_spec_version,
            sdk_version = %version.sdk_version,
            "Received version report"
        );
        Ok(version)
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, target: &str) -> Result<Arc<dyn DeviceApi>, DeviceError> {
        let location = location_for_target(target)?;
        info!(target = %target, location = %location, "Connecting to traffic generator");

        let capabilities = match self.fetch_version(&location).await {
            Ok(version) => CapabilityDescriptor::for_version(version),
            Err(e) if e.is_unreachable() => return Err(e),
            Err(e) => {
                warn!(
                    target = %target,
                    error = %e,
                    "Version report unavailable, advertising all features"
                );
                CapabilityDescriptor::all()
            }
        };

        let features: Vec<_> = capabilities.features().map(|f| f.as_str()).collect();
        info!(target = %target, features = ?features, "Capabilities discovered");

        Ok(Arc::new(HttpDevice {
            client: self.client.clone(),
            location,
            capabilities,
        }))
    }

    async fn version(&self, target: &str) -> Result<CapabilitiesVersion, DeviceError> {
        let location = location_for_target(target)?;
        self.fetch_version(&location).await
    }
}

/// One device reached over HTTP
#[derive(Debug)]
pub struct HttpDevice {
    client: reqwest::Client,
    location: String,
    capabilities: CapabilityDescriptor,
}

impl HttpDevice {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.location, path)
    }

    async fn check(response: reqwest::Response) -> Result<Vec<u8>, DeviceError> {
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if !status.is_success() {
            return Err(DeviceError::Status {
                status: status.as_u16(),
                message: error_message(&String::from_utf8_lossy(&body)),
            });
        }
        Ok(body)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Vec<u8>, DeviceError> {
        let url = self.url(path);
        trace!(url = %url, body = %body, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        Self::check(response).await
    }

    async fn post_reply(&self, path: &str, body: &Value) -> Result<ControlStateResponse, DeviceError> {
        let bytes = self.post(path, body).await?;
        decode_or_default(&bytes)
    }
}

#[async_trait]
impl DeviceApi for HttpDevice {
    fn location(&self) -> &str {
        &self.location
    }

    fn capabilities(&self) -> &CapabilityDescriptor {
        &self.capabilities
    }

    async fn get_config(&self) -> Result<Value, DeviceError> {
        let url = self.url("/config");
        trace!(url = %url, "GET");
        let response = self.client.get(&url).send().await?;
        let bytes = Self::check(response).await?;
        decode(&bytes)
    }

    async fn set_config(&self, config: &Value) -> Result<ControlStateResponse, DeviceError> {
        self.post_reply("/config", config).await
    }

    async fn start_transmit(&self) -> Result<(), DeviceError> {
        self.post("/control/transmit/start", &json!({})).await.map(|_| ())
    }

    async fn stop_transmit(&self) -> Result<(), DeviceError> {
        self.post("/control/transmit/stop", &json!({})).await.map(|_| ())
    }

    async fn set_flow_transmit(&self, state: TrafficState) -> Result<(), DeviceError> {
        self.post("/control/flow_transmit", &json!({ "state": state.as_str() }))
            .await
            .map(|_| ())
    }

    async fn set_transmit_state(&self, request: &TransmitStateRequest) -> Result<(), DeviceError> {
        let body = to_body(request)?;
        self.post("/control/transmit", &body).await.map(|_| ())
    }

    async fn set_control_state(
        &self,
        state: &ControlState,
    ) -> Result<ControlStateResponse, DeviceError> {
        self.post_reply("/control/state", &state.render()).await
    }

    async fn set_capture_state(
        &self,
        request: &CaptureStateRequest,
    ) -> Result<ControlStateResponse, DeviceError> {
        let body = to_body(request)?;
        self.post_reply("/control/capture", &body).await
    }

    async fn start_capture(&self, port: &str) -> Result<ControlStateResponse, DeviceError> {
        self.post_reply("/control/capture/start", &json!({ "port_names": [port] }))
            .await
    }

    async fn stop_capture(&self, port: &str) -> Result<ControlStateResponse, DeviceError> {
        self.post_reply("/control/capture/stop", &json!({ "port_names": [port] }))
            .await
    }

    async fn get_capture(&self, request: &CaptureRequest) -> Result<Vec<u8>, DeviceError> {
        let body = to_body(request)?;
        let bytes = self.post("/capture", &body).await?;
        debug!(port = %request.port_name, size = bytes.len(), "Received capture");
        Ok(bytes)
    }

    async fn get_metrics(&self, request: &MetricsRequest) -> Result<Metrics, DeviceError> {
        let bytes = self.post("/monitor/metrics", &request.render()).await?;
        decode(&bytes)
    }
}

fn to_body<T: serde::Serialize>(request: &T) -> Result<Value, DeviceError> {
    serde_json::to_value(request).map_err(|e| DeviceError::Decode(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DeviceError> {
    serde_json::from_slice(bytes).map_err(|e| DeviceError::Decode(e.to_string()))
}

/// Empty bodies are a valid reply to state-setting calls
fn decode_or_default<T: DeserializeOwned + Default>(bytes: &[u8]) -> Result<T, DeviceError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    decode(bytes)
}

/// Extract the device's `errors` text from an error body
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    match parsed.as_ref().and_then(|v| v.get("errors")) {
        Some(Value::Array(errors)) => errors
            .iter()
            .map(|e| match e {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        Some(Value::String(s)) => s.clone(),
        _ if body.trim().is_empty() => "no details".to_string(),
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Feature;
    use axum::extract::State;
    use axum::http::{StatusCode, Uri};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    /// (path, body) of every request a scripted device recorded
    type Seen = Arc<Mutex<Vec<(String, String)>>>;

    fn record(seen: &Seen, uri: &Uri, body: String) {
        seen.lock().unwrap().push((uri.path().to_string(), body));
    }

    async fn control_state(State(seen): State<Seen>, uri: Uri, body: String) -> Json<Value> {
        record(&seen, &uri, body);
        Json(json!({ "warnings": ["port p2 idle"] }))
    }

    async fn flow_metrics(State(seen): State<Seen>, uri: Uri, body: String) -> Json<Value> {
        record(&seen, &uri, body);
        Json(json!({
            "choice": "flow_metrics",
            "flow_metrics": [{ "name": "f1", "frames_tx_rate": 0.0 }]
        }))
    }

    async fn transmit_removed() -> (StatusCode, Json<Value>) {
        (
            StatusCode::NOT_FOUND,
            Json(json!({
                "code": 404,
                "errors": ["start_transmit removed", "use control state"]
            })),
        )
    }

    /// Accepts anything with an empty 200 reply
    async fn accepted(State(seen): State<Seen>, uri: Uri, body: String) -> StatusCode {
        record(&seen, &uri, body);
        StatusCode::OK
    }

    fn modern_device(seen: Seen) -> Router {
        Router::new()
            .route(
                VERSION_PATH,
                get(|| async {
                    Json(json!({
                        "api_spec_version": "1.0.0",
                        "sdk_version": "1.30.0",
                        "app_version": "1.2.3"
                    }))
                }),
            )
            .route(
                "/config",
                get(|| async { Json(json!({ "ports": [{ "name": "p1" }] })) }),
            )
            .route("/control/state", post(control_state))
            .route("/control/transmit/start", post(transmit_removed))
            .route("/monitor/metrics", post(flow_metrics))
            .fallback(accepted)
            .with_state(seen)
    }

    fn versionless_device(seen: Seen) -> Router {
        Router::new()
            .route(
                VERSION_PATH,
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "internal") }),
            )
            .fallback(accepted)
            .with_state(seen)
    }

    /// Serve a scripted device on an ephemeral port
    async fn serve(device: fn(Seen) -> Router) -> (String, Seen) {
        let seen = Seen::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = device(seen.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{}", addr), seen)
    }

    fn connector() -> HttpConnector {
        HttpConnector::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_connect_discovers_control_state_dialect() {
        let (location, seen) = serve(modern_device).await;
        let device = connector().connect(&location).await.unwrap();

        assert_eq!(device.location(), location);
        assert!(device.capabilities().has(Feature::ControlState));
        assert!(!device.capabilities().has(Feature::TransmitState));
        assert_eq!(
            device.capabilities().version().unwrap().sdk_version,
            "1.30.0"
        );

        let reply = device
            .set_control_state(&ControlState::FlowTransmit {
                state: TrafficState::Stop,
            })
            .await
            .unwrap();
        assert_eq!(reply.warnings, vec!["port p2 idle"]);

        let requests = seen.lock().unwrap().clone();
        let (path, body) = requests.last().unwrap();
        assert_eq!(path, "/control/state");
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["traffic"]["flow_transmit"]["state"], "stop");
    }

    #[tokio::test]
    async fn test_status_error_carries_device_errors() {
        let (location, _seen) = serve(modern_device).await;
        let device = connector().connect(&location).await.unwrap();

        let err = device.start_transmit().await.unwrap_err();
        match err {
            DeviceError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "start_transmit removed; use control state");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_metrics_and_config() {
        let (location, seen) = serve(modern_device).await;
        let device = connector().connect(&location).await.unwrap();

        let metrics = device
            .get_metrics(&MetricsRequest::all_flows())
            .await
            .unwrap();
        assert_eq!(metrics.flow_metrics[0].name, "f1");
        assert_eq!(metrics.flow_metrics[0].frames_tx_rate, Some(0.0));

        let requests = seen.lock().unwrap().clone();
        let (path, body) = requests.last().unwrap();
        assert_eq!(path, "/monitor/metrics");
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["choice"], "flow");

        let config = device.get_config().await.unwrap();
        assert_eq!(config["ports"][0]["name"], "p1");
    }

    #[tokio::test]
    async fn test_version_failure_advertises_all_features() {
        let (location, seen) = serve(versionless_device).await;
        let connector = connector();

        let device = connector.connect(&location).await.unwrap();
        assert_eq!(device.capabilities().features().count(), Feature::ALL.len());
        assert!(device.capabilities().version().is_none());

        let err = connector.version(&location).await.unwrap_err();
        assert!(matches!(err, DeviceError::Status { status: 500, .. }));

        // Empty replies to state-setting calls decode as no warnings
        let reply = device.start_capture("p1").await.unwrap();
        assert!(reply.warnings.is_empty());

        let requests = seen.lock().unwrap().clone();
        let (path, body) = requests.last().unwrap();
        assert_eq!(path, "/control/capture/start");
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["port_names"], json!(["p1"]));
    }

    #[tokio::test]
    async fn test_unreachable_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connector()
            .connect(&format!("http://{}", addr))
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(error_message(r#"{"errors":"bad flow"}"#), "bad flow");
        assert_eq!(error_message("plain failure\n"), "plain failure");
        assert_eq!(error_message(""), "no details");
    }
}
