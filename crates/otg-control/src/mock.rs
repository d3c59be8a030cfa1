//! Scriptable device and connector for tests

use async_trait::async_trait;
use otg_core::CapabilitiesVersion;
use otg_device::{
    CapabilityDescriptor, CaptureRequest, CaptureStateRequest, Connector, ControlState,
    ControlStateResponse, DeviceApi, DeviceError, Feature, FlowMetric, Metrics, MetricsRequest,
    TrafficState, TransmitStateRequest,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct MockDevice {
    capabilities: CapabilityDescriptor,
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<String>>,
    metrics_requests: Mutex<Vec<MetricsRequest>>,
    flow_rates: Vec<Option<f64>>,
    port_metrics: Vec<Value>,
    capture: Vec<u8>,
    control_capture: Option<String>,
    warnings: Vec<String>,
    config: Mutex<Value>,
}

impl MockDevice {
    /// Device advertising every feature, with every call succeeding
    pub fn new() -> Self {
        Self {
            capabilities: CapabilityDescriptor::all(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            metrics_requests: Mutex::new(Vec::new()),
            flow_rates: Vec::new(),
            port_metrics: Vec::new(),
            capture: Vec::new(),
            control_capture: None,
            warnings: Vec::new(),
            config: Mutex::new(json!({})),
        }
    }

    pub fn with_features(features: impl IntoIterator<Item = Feature>) -> Self {
        Self {
            capabilities: CapabilityDescriptor::from_features(features),
            ..Self::new()
        }
    }

    /// Make the named call fail with a device status error
    pub fn failing(mut self, call: &'static str) -> Self {
        self.failing.insert(call);
        self
    }

    /// One flow per entry; `None` omits the rate
    pub fn with_flow_rates(mut self, rates: Vec<Option<f64>>) -> Self {
        self.flow_rates = rates;
        self
    }

    pub fn with_port_metrics(mut self, rows: Vec<Value>) -> Self {
        self.port_metrics = rows;
        self
    }

    pub fn with_capture(mut self, bytes: &[u8]) -> Self {
        self.capture = bytes.to_vec();
        self
    }

    /// Base64 payload returned by control-state capture retrieval
    pub fn with_control_capture(mut self, encoded: &str) -> Self {
        self.control_capture = Some(encoded.to_string());
        self
    }

    pub fn with_warnings(mut self, warnings: &[&str]) -> Self {
        self.warnings = warnings.iter().map(|w| w.to_string()).collect();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn metrics_requests(&self) -> Vec<MetricsRequest> {
        self.metrics_requests.lock().clone()
    }

    fn record(&self, call: &'static str) -> Result<(), DeviceError> {
        self.calls.lock().push(call.to_string());
        if self.failing.contains(call) {
            return Err(DeviceError::Status {
                status: 400,
                message: format!("{} rejected", call),
            });
        }
        Ok(())
    }

    fn reply(&self) -> ControlStateResponse {
        ControlStateResponse::with_warnings(self.warnings.clone())
    }
}

#[async_trait]
impl DeviceApi for MockDevice {
    fn location(&self) -> &str {
        "https://mock:8443"
    }

    fn capabilities(&self) -> &CapabilityDescriptor {
        &self.capabilities
    }

    async fn get_config(&self) -> Result<Value, DeviceError> {
        self.record("get_config")?;
        Ok(self.config.lock().clone())
    }

    async fn set_config(&self, config: &Value) -> Result<ControlStateResponse, DeviceError> {
        self.record("set_config")?;
        *self.config.lock() = config.clone();
        Ok(self.reply())
    }

    async fn start_transmit(&self) -> Result<(), DeviceError> {
        self.record("start_transmit")
    }

    async fn stop_transmit(&self) -> Result<(), DeviceError> {
        self.record("stop_transmit")
    }

    async fn set_flow_transmit(&self, _state: TrafficState) -> Result<(), DeviceError> {
        self.record("set_flow_transmit")
    }

    async fn set_transmit_state(&self, _request: &TransmitStateRequest) -> Result<(), DeviceError> {
        self.record("set_transmit_state")
    }

    async fn set_control_state(
        &self,
        state: &ControlState,
    ) -> Result<ControlStateResponse, DeviceError> {
        self.record("set_control_state")?;
        let mut reply = self.reply();
        if matches!(state, ControlState::CaptureRetrieve { .. }) {
            reply.capture = self.control_capture.clone();
        }
        Ok(reply)
    }

    async fn set_capture_state(
        &self,
        _request: &CaptureStateRequest,
    ) -> Result<ControlStateResponse, DeviceError> {
        self.record("set_capture_state")?;
        Ok(self.reply())
    }

    async fn start_capture(&self, _port: &str) -> Result<ControlStateResponse, DeviceError> {
        self.record("start_capture")?;
        Ok(self.reply())
    }

    async fn stop_capture(&self, _port: &str) -> Result<ControlStateResponse, DeviceError> {
        self.record("stop_capture")?;
        Ok(self.reply())
    }

    async fn get_capture(&self, _request: &CaptureRequest) -> Result<Vec<u8>, DeviceError> {
        self.record("get_capture")?;
        Ok(self.capture.clone())
    }

    async fn get_metrics(&self, request: &MetricsRequest) -> Result<Metrics, DeviceError> {
        self.metrics_requests.lock().push(request.clone());
        self.record("get_metrics")?;

        let metrics = match request {
            MetricsRequest::Flow(_) => Metrics {
                port_metrics: Vec::new(),
                flow_metrics: self
                    .flow_rates
                    .iter()
                    .enumerate()
                    .map(|(i, rate)| FlowMetric {
                        name: format!("f{}", i + 1),
                        frames_tx_rate: *rate,
                        ..Default::default()
                    })
                    .collect(),
            },
            MetricsRequest::Port(_) => Metrics {
                port_metrics: self.port_metrics.clone(),
                flow_metrics: Vec::new(),
            },
        };
        Ok(metrics)
    }
}

/// Connector handing out a fresh [`MockDevice`] per connection
#[derive(Debug)]
pub struct MockConnector {
    template: fn() -> MockDevice,
    delay: Duration,
    unreachable: HashSet<String>,
    versions: HashMap<String, CapabilitiesVersion>,
    version_delays: HashMap<String, Duration>,
    connects: AtomicUsize,
    created: Mutex<Vec<Arc<MockDevice>>>,
}

impl MockConnector {
    pub fn new(template: fn() -> MockDevice) -> Self {
        Self {
            template,
            delay: Duration::ZERO,
            unreachable: HashSet::new(),
            versions: HashMap::new(),
            version_delays: HashMap::new(),
            connects: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Delay each connection, to widen race windows
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_unreachable(mut self, target: &str) -> Self {
        self.unreachable.insert(target.to_string());
        self
    }

    pub fn with_version(mut self, target: &str, sdk_version: &str) -> Self {
        self.versions.insert(
            target.to_string(),
            CapabilitiesVersion {
                api_spec_version: "1.0.0".to_string(),
                sdk_version: sdk_version.to_string(),
                app_version: "1.0.0".to_string(),
            },
        );
        self
    }

    /// Delay the version report of one target
    pub fn with_version_delay(mut self, target: &str, delay: Duration) -> Self {
        self.version_delays.insert(target.to_string(), delay);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Devices handed out so far, oldest first
    pub fn created(&self) -> Vec<Arc<MockDevice>> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, target: &str) -> Result<Arc<dyn DeviceApi>, DeviceError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unreachable.contains(target) {
            return Err(DeviceError::Unreachable(format!("connection refused: {}", target)));
        }

        let device = Arc::new((self.template)());
        self.created.lock().push(device.clone());
        Ok(device)
    }

    async fn version(&self, target: &str) -> Result<CapabilitiesVersion, DeviceError> {
        if let Some(delay) = self.version_delays.get(target) {
            tokio::time::sleep(*delay).await;
        }
        if self.unreachable.contains(target) {
            return Err(DeviceError::Unreachable(format!("connection refused: {}", target)));
        }
        self.versions
            .get(target)
            .cloned()
            .ok_or_else(|| DeviceError::Status {
                status: 404,
                message: "version report unavailable".to_string(),
            })
    }
}

/// True when both handles point at the same device
pub fn same_handle(a: &Arc<dyn DeviceApi>, b: &Arc<dyn DeviceApi>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
