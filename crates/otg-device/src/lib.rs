//! OTG Device - Protocol abstraction for OTG traffic generators
//!
//! This crate describes what a connected device can do and how to talk to it:
//! - `DeviceApi` and `Connector` traits at the protocol seam
//! - Capability descriptors computed once from the device version report
//! - Choice objects and request bodies for each historical protocol shape
//! - An HTTP implementation over reqwest

pub mod api;
pub mod capability;
pub mod http;
pub mod metrics;
pub mod state;

pub use api::{location_for_target, Connector, DeviceApi, DeviceError};
pub use capability::{CapabilityDescriptor, Feature, CONTROL_STATE_MIN_VERSION};
pub use http::{HttpConnector, HttpDevice, DEFAULT_REQUEST_TIMEOUT};
pub use metrics::{FlowMetric, Metrics, MetricsRequest};
pub use state::{
    CaptureAction, CaptureRequest, CaptureStateRequest, ControlState, ControlStateResponse,
    TrafficState, TransmitStateRequest,
};
