//! Post-stop traffic verification
//!
//! After a stop call is accepted, flow metrics are polled until every flow's
//! transmit rate drops below a threshold. The poll runs on its own task and
//! ends on success, timeout, or cancellation.

use otg_device::{DeviceApi, MetricsRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ControlError;

/// Poll timing and threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifyOptions {
    pub interval: Duration,
    pub timeout: Duration,
    /// Rate below which a flow counts as stopped
    pub threshold: f64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(5),
            threshold: 0.1,
        }
    }
}

/// Wait until traffic on `device` has stopped
///
/// Returns `VerificationTimeout` when flows keep transmitting past the
/// timeout and `Cancelled` when `cancel` fires first. Dropping the returned
/// future also stops the poll.
pub async fn verify_traffic_stopped(
    device: Arc<dyn DeviceApi>,
    options: VerifyOptions,
    cancel: CancellationToken,
) -> Result<(), ControlError> {
    let cancel = cancel.child_token();
    let _stop_on_drop = cancel.clone().drop_guard();
    let task = tokio::spawn(poll(device, options, cancel));
    match task.await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Verification task failed");
            Err(ControlError::Cancelled)
        }
    }
}

async fn poll(
    device: Arc<dyn DeviceApi>,
    options: VerifyOptions,
    cancel: CancellationToken,
) -> Result<(), ControlError> {
    info!(timeout = ?options.timeout, threshold = options.threshold, "Verifying traffic has stopped");

    let request = MetricsRequest::all_flows();
    let start = Instant::now();
    let deadline = start + options.timeout;

    while start.elapsed() < options.timeout {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ControlError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => break,
            result = device.get_metrics(&request) => result,
        };

        match result {
            Ok(metrics) if metrics.flow_metrics.is_empty() => {
                info!("No flow metrics available, traffic is stopped");
                return Ok(());
            }
            Ok(metrics) => match metrics.running_flow(options.threshold) {
                Some(flow) => debug!(
                    flow = %flow.name,
                    rate = ?flow.frames_tx_rate,
                    "Flow still transmitting"
                ),
                None => {
                    info!(elapsed = ?start.elapsed(), "All flows verified stopped");
                    return Ok(());
                }
            },
            Err(e) => warn!(error = %e, "Error checking traffic status"),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ControlError::Cancelled),
            _ = tokio::time::sleep(options.interval) => {}
        }
    }

    warn!(timeout = ?options.timeout, "Timed out waiting for traffic to stop");
    Err(ControlError::VerificationTimeout(options.timeout))
}
