//! Capability descriptors
//!
//! A descriptor lists the protocol features a device understands. It is
//! computed once when a connection handle is built and consulted by every
//! strategy chain afterwards.

use otg_core::{CapabilitiesVersion, VersionTuple};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// First `api_spec_version` that speaks the control-state dialect
pub const CONTROL_STATE_MIN_VERSION: [u64; 3] = [0, 11, 0];

/// Protocol operations a device may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    StartTransmit,
    StopTransmit,
    SetFlowTransmit,
    TransmitState,
    ControlState,
    CaptureState,
    StartCapture,
    StopCapture,
    CaptureRequest,
    GetCapture,
}

impl Feature {
    pub const ALL: [Feature; 10] = [
        Feature::StartTransmit,
        Feature::StopTransmit,
        Feature::SetFlowTransmit,
        Feature::TransmitState,
        Feature::ControlState,
        Feature::CaptureState,
        Feature::StartCapture,
        Feature::StopCapture,
        Feature::CaptureRequest,
        Feature::GetCapture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::StartTransmit => "start_transmit",
            Feature::StopTransmit => "stop_transmit",
            Feature::SetFlowTransmit => "set_flow_transmit",
            Feature::TransmitState => "transmit_state",
            Feature::ControlState => "control_state",
            Feature::CaptureState => "capture_state",
            Feature::StartCapture => "start_capture",
            Feature::StopCapture => "stop_capture",
            Feature::CaptureRequest => "capture_request",
            Feature::GetCapture => "get_capture",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Features advertised by one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    features: BTreeSet<Feature>,
    /// Version report, when the device answered one
    version: Option<CapabilitiesVersion>,
}

impl CapabilityDescriptor {
    /// Descriptor from an explicit feature list
    pub fn from_features(features: impl IntoIterator<Item = Feature>) -> Self {
        Self {
            features: features.into_iter().collect(),
            version: None,
        }
    }

    /// Every feature; the strategy order alone decides what is tried
    pub fn all() -> Self {
        Self::from_features(Feature::ALL)
    }

    /// Descriptor for a device that reported its version
    ///
    /// Devices at or above [`CONTROL_STATE_MIN_VERSION`] speak the
    /// control-state dialect; older ones speak the legacy transmit/capture
    /// state dialect and accept flow transmit for starting traffic. An unparseable `api_spec_version` advertises every
    /// feature.
    pub fn for_version(version: CapabilitiesVersion) -> Self {
        let features: Vec<Feature> = match VersionTuple::parse(&version.api_spec_version) {
            Some(tuple) => {
                if tuple.padded(3) >= VersionTuple::from_parts(CONTROL_STATE_MIN_VERSION.to_vec()) {
                    vec![
                        Feature::ControlState,
                        Feature::CaptureRequest,
                        Feature::GetCapture,
                    ]
                } else {
                    vec![
                        Feature::SetFlowTransmit,
                        Feature::TransmitState,
                        Feature::CaptureState,
                        Feature::CaptureRequest,
                        Feature::GetCapture,
                    ]
                }
            }
            None => Feature::ALL.to_vec(),
        };

        Self {
            features: features.into_iter().collect(),
            version: Some(version),
        }
    }

    pub fn has(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// True when every listed feature is advertised
    pub fn supports_all(&self, required: &[Feature]) -> bool {
        required.iter().all(|f| self.has(*f))
    }

    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.features.iter().copied()
    }

    pub fn version(&self) -> Option<&CapabilitiesVersion> {
        self.version.as_ref()
    }
}
