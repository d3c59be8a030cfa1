//! Choice objects and request bodies for the device control protocol
//!
//! Newer devices take a single three-level choice object on
//! `/control/state`:
//!
//! ```json
//! {"choice": "traffic", "traffic": {"choice": "flow_transmit", "flow_transmit": {"state": "start"}}}
//! ```
//!
//! Older devices take flat request bodies on dedicated endpoints. Both are
//! modelled here as closed types rendered by a single function each.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::DeviceError;

/// Traffic transmit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficState {
    Start,
    Stop,
}

impl TrafficState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficState::Start => "start",
            TrafficState::Stop => "stop",
        }
    }
}

/// Port capture state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureAction {
    Start,
    Stop,
}

impl CaptureAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureAction::Start => "start",
            CaptureAction::Stop => "stop",
        }
    }
}

/// Three-level control-state choice object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlState {
    /// traffic / flow_transmit / state
    FlowTransmit { state: TrafficState },
    /// port / capture / state + port_names
    PortCapture {
        state: CaptureAction,
        port_names: Vec<String>,
    },
    /// capture / port_name, state = retrieve
    CaptureRetrieve { port_name: String },
}

impl ControlState {
    /// Render to the wire object
    pub fn render(&self) -> Value {
        match self {
            ControlState::FlowTransmit { state } => json!({
                "choice": "traffic",
                "traffic": {
                    "choice": "flow_transmit",
                    "flow_transmit": { "state": state.as_str() },
                },
            }),
            ControlState::PortCapture { state, port_names } => json!({
                "choice": "port",
                "port": {
                    "choice": "capture",
                    "capture": {
                        "state": state.as_str(),
                        "port_names": port_names,
                    },
                },
            }),
            ControlState::CaptureRetrieve { port_name } => json!({
                "choice": "capture",
                "capture": {
                    "port_name": port_name,
                    "state": "retrieve",
                },
            }),
        }
    }
}

/// Legacy `/control/transmit` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitStateRequest {
    pub state: TrafficState,
    /// Empty means every flow
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flow_names: Vec<String>,
}

/// Legacy `/control/capture` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStateRequest {
    pub state: CaptureAction,
    pub port_names: Vec<String>,
}

/// `/capture` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub port_name: String,
}

/// Reply to a state-setting call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlStateResponse {
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Base64 capture payload, only present on capture retrieval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<String>,
}

impl ControlStateResponse {
    pub fn with_warnings(warnings: Vec<String>) -> Self {
        Self {
            warnings,
            capture: None,
        }
    }

    /// Decode the capture payload carried by a retrieve reply
    pub fn capture_bytes(&self, port: &str) -> Result<Vec<u8>, DeviceError> {
        let encoded = match self.capture.as_deref() {
            Some(data) if !data.is_empty() => data,
            _ => {
                return Err(DeviceError::NoCaptureData {
                    port: port.to_string(),
                })
            }
        };

        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DeviceError::Decode(format!("Invalid capture payload: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_flow_transmit() {
        let value = ControlState::FlowTransmit {
            state: TrafficState::Stop,
        }
        .render();
        assert_eq!(value["choice"], "traffic");
        assert_eq!(value["traffic"]["choice"], "flow_transmit");
        assert_eq!(value["traffic"]["flow_transmit"]["state"], "stop");
    }

    #[test]
    fn test_render_port_capture() {
        let value = ControlState::PortCapture {
            state: CaptureAction::Start,
            port_names: vec!["p1".to_string(), "p2".to_string()],
        }
        .render();
        assert_eq!(value["choice"], "port");
        assert_eq!(value["port"]["choice"], "capture");
        assert_eq!(value["port"]["capture"]["state"], "start");
        assert_eq!(value["port"]["capture"]["port_names"], json!(["p1", "p2"]));
    }

    #[test]
    fn test_render_capture_retrieve() {
        let value = ControlState::CaptureRetrieve {
            port_name: "p1".to_string(),
        }
        .render();
        assert_eq!(value["choice"], "capture");
        assert_eq!(value["capture"]["state"], "retrieve");
        assert_eq!(value["capture"]["port_name"], "p1");
    }

    #[test]
    fn test_transmit_state_body() {
        let body = serde_json::to_value(TransmitStateRequest {
            state: TrafficState::Stop,
            flow_names: Vec::new(),
        })
        .unwrap();
        assert_eq!(body, json!({"state": "stop"}));
    }

    #[test]
    fn test_capture_bytes() {
        let reply = ControlStateResponse {
            warnings: Vec::new(),
            capture: Some("1MOyoQ==".to_string()),
        };
        assert_eq!(reply.capture_bytes("p1").unwrap(), vec![0xd4, 0xc3, 0xb2, 0xa1]);

        let empty = ControlStateResponse::default();
        assert!(matches!(
            empty.capture_bytes("p1"),
            Err(DeviceError::NoCaptureData { .. })
        ));

        let garbage = ControlStateResponse {
            warnings: Vec::new(),
            capture: Some("***".to_string()),
        };
        assert!(matches!(garbage.capture_bytes("p1"), Err(DeviceError::Decode(_))));
    }
}
