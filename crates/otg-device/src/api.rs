//! Device protocol seam
//!
//! [`DeviceApi`] is one connected device. Each method is one protocol call in
//! one historical shape; callers pick which calls to try from the device's
//! [`CapabilityDescriptor`]. [`Connector`] builds handles and answers version
//! reports.

use async_trait::async_trait;
use otg_core::CapabilitiesVersion;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

use crate::capability::CapabilityDescriptor;
use crate::metrics::{Metrics, MetricsRequest};
use crate::state::{
    CaptureRequest, CaptureStateRequest, ControlState, ControlStateResponse, TrafficState,
    TransmitStateRequest,
};

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Transport error: {0}")]
    Transport(reqwest::Error),
    #[error("Target unreachable: {0}")]
    Unreachable(String),
    #[error("Device returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Invalid location: {0}")]
    InvalidLocation(String),
    #[error("No capture data returned for port {port}")]
    NoCaptureData { port: String },
}

impl DeviceError {
    /// Connection-level failure, as opposed to a device that answered badly
    pub fn is_unreachable(&self) -> bool {
        matches!(self, DeviceError::Unreachable(_))
    }
}

impl From<reqwest::Error> for DeviceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            DeviceError::Unreachable(e.to_string())
        } else if e.is_decode() {
            DeviceError::Decode(e.to_string())
        } else {
            DeviceError::Transport(e)
        }
    }
}

/// Resolve a target identifier to a connection location
///
/// Targets without a scheme default to HTTPS.
pub fn location_for_target(target: &str) -> Result<String, DeviceError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(DeviceError::InvalidLocation("empty target".to_string()));
    }

    match target.split_once("://") {
        None => Ok(format!("https://{}", target.trim_end_matches('/'))),
        Some((scheme @ ("http" | "https"), rest)) => {
            let host = rest.trim_end_matches('/');
            if host.is_empty() {
                Err(DeviceError::InvalidLocation(target.to_string()))
            } else {
                Ok(format!("{}://{}", scheme, host))
            }
        }
        Some(_) => Err(DeviceError::InvalidLocation(target.to_string())),
    }
}

/// One connected traffic generator
#[async_trait]
pub trait DeviceApi: Send + Sync + Debug {
    /// Location this handle talks to
    fn location(&self) -> &str;

    /// Features discovered when the handle was built
    fn capabilities(&self) -> &CapabilityDescriptor;

    async fn get_config(&self) -> Result<Value, DeviceError>;

    async fn set_config(&self, config: &Value) -> Result<ControlStateResponse, DeviceError>;

    async fn start_transmit(&self) -> Result<(), DeviceError>;

    async fn stop_transmit(&self) -> Result<(), DeviceError>;

    async fn set_flow_transmit(&self, state: TrafficState) -> Result<(), DeviceError>;

    async fn set_transmit_state(&self, request: &TransmitStateRequest) -> Result<(), DeviceError>;

    async fn set_control_state(
        &self,
        state: &ControlState,
    ) -> Result<ControlStateResponse, DeviceError>;

    async fn set_capture_state(
        &self,
        request: &CaptureStateRequest,
    ) -> Result<ControlStateResponse, DeviceError>;

    async fn start_capture(&self, port: &str) -> Result<ControlStateResponse, DeviceError>;

    async fn stop_capture(&self, port: &str) -> Result<ControlStateResponse, DeviceError>;

    /// Raw capture bytes for one port
    async fn get_capture(&self, request: &CaptureRequest) -> Result<Vec<u8>, DeviceError>;

    async fn get_metrics(&self, request: &MetricsRequest) -> Result<Metrics, DeviceError>;
}

/// Builds device handles
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Connect to a target and discover its capabilities
    async fn connect(&self, target: &str) -> Result<Arc<dyn DeviceApi>, DeviceError>;

    /// Fetch the target's version report
    async fn version(&self, target: &str) -> Result<CapabilitiesVersion, DeviceError>;
}
