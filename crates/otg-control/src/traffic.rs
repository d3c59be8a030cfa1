//! Traffic start and stop chains
//!
//! Start: direct transmit, flow transmit, control state.
//! Stop: direct transmit, transmit state, control state, flow transmit,
//! followed by the verification poll.

use async_trait::async_trait;
use otg_device::{ControlState, DeviceApi, DeviceError, Feature, TrafficState, TransmitStateRequest};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ControlError;
use crate::strategy::{run_chain, BoxedStrategy, ChainOutcome, Strategy};
use crate::verify::{verify_traffic_stopped, VerifyOptions};

/// Single `start_transmit` / `stop_transmit` call
struct DirectTransmit(TrafficState);

#[async_trait]
impl Strategy for DirectTransmit {
    type Output = ();

    fn name(&self) -> &'static str {
        match self.0 {
            TrafficState::Start => "start_transmit",
            TrafficState::Stop => "stop_transmit",
        }
    }

    fn required(&self) -> &'static [Feature] {
        match self.0 {
            TrafficState::Start => &[Feature::StartTransmit],
            TrafficState::Stop => &[Feature::StopTransmit],
        }
    }

    async fn attempt(&self, device: &dyn DeviceApi) -> Result<(), DeviceError> {
        match self.0 {
            TrafficState::Start => device.start_transmit().await,
            TrafficState::Stop => device.stop_transmit().await,
        }
    }
}

/// `set_flow_transmit(state)`
struct FlowTransmit(TrafficState);

#[async_trait]
impl Strategy for FlowTransmit {
    type Output = ();

    fn name(&self) -> &'static str {
        "set_flow_transmit"
    }

    fn required(&self) -> &'static [Feature] {
        &[Feature::SetFlowTransmit]
    }

    async fn attempt(&self, device: &dyn DeviceApi) -> Result<(), DeviceError> {
        device.set_flow_transmit(self.0).await
    }
}

/// Legacy transmit-state object applied to every flow
struct TransmitState(TrafficState);

#[async_trait]
impl Strategy for TransmitState {
    type Output = ();

    fn name(&self) -> &'static str {
        "transmit_state"
    }

    fn required(&self) -> &'static [Feature] {
        &[Feature::TransmitState]
    }

    async fn attempt(&self, device: &dyn DeviceApi) -> Result<(), DeviceError> {
        let request = TransmitStateRequest {
            state: self.0,
            flow_names: Vec::new(),
        };
        device.set_transmit_state(&request).await
    }
}

/// traffic / flow_transmit control-state object
struct TrafficControlState(TrafficState);

#[async_trait]
impl Strategy for TrafficControlState {
    type Output = ();

    fn name(&self) -> &'static str {
        "control_state"
    }

    fn required(&self) -> &'static [Feature] {
        &[Feature::ControlState]
    }

    async fn attempt(&self, device: &dyn DeviceApi) -> Result<(), DeviceError> {
        let state = ControlState::FlowTransmit { state: self.0 };
        device.set_control_state(&state).await.map(|reply| {
            for warning in &reply.warnings {
                warn!(warning = %warning, "Device warning");
            }
        })
    }
}

fn start_chain() -> Vec<BoxedStrategy<'static, ()>> {
    vec![
        Box::new(DirectTransmit(TrafficState::Start)),
        Box::new(FlowTransmit(TrafficState::Start)),
        Box::new(TrafficControlState(TrafficState::Start)),
    ]
}

fn stop_chain() -> Vec<BoxedStrategy<'static, ()>> {
    vec![
        Box::new(DirectTransmit(TrafficState::Stop)),
        Box::new(TransmitState(TrafficState::Stop)),
        Box::new(TrafficControlState(TrafficState::Stop)),
        Box::new(FlowTransmit(TrafficState::Stop)),
    ]
}

/// Start traffic with the first accepted protocol shape
///
/// Start is not verified against metrics.
pub async fn start_traffic(device: &dyn DeviceApi) -> Result<ChainOutcome<()>, ControlError> {
    info!(location = %device.location(), "Starting traffic");
    run_chain("start_traffic", device, &start_chain()).await
}

/// Result of a stop request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    pub strategy: &'static str,
    /// Whether metrics confirmed every flow stopped
    pub verified: bool,
}

/// Stop traffic, then poll metrics until it has actually stopped
///
/// Verification failure does not trigger another strategy; it is reported
/// as `verified = false`.
pub async fn stop_traffic(
    device: Arc<dyn DeviceApi>,
    options: VerifyOptions,
    cancel: CancellationToken,
) -> Result<StopOutcome, ControlError> {
    info!(location = %device.location(), "Stopping traffic");
    let outcome = run_chain("stop_traffic", device.as_ref(), &stop_chain()).await?;

    let verified = match verify_traffic_stopped(device, options, cancel).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Traffic stop not verified");
            false
        }
    };

    Ok(StopOutcome {
        strategy: outcome.strategy,
        verified,
    })
}
