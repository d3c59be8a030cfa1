//! Fallback chains over protocol shapes
//!
//! A chain is an ordered list of strategies. Strategies whose required
//! features the device does not advertise are skipped; the rest are tried
//! in order until one succeeds.

use async_trait::async_trait;
use otg_device::{CapabilityDescriptor, DeviceApi, DeviceError, Feature};
use tracing::{debug, info, warn};

use crate::error::ControlError;

/// One way of performing an operation
#[async_trait]
pub trait Strategy: Send + Sync {
    type Output: Send;

    fn name(&self) -> &'static str;

    /// Features the device must advertise for this strategy to be tried
    fn required(&self) -> &'static [Feature];

    fn is_supported(&self, capabilities: &CapabilityDescriptor) -> bool {
        capabilities.supports_all(self.required())
    }

    async fn attempt(&self, device: &dyn DeviceApi) -> Result<Self::Output, DeviceError>;
}

/// Boxed strategy producing `T`
pub type BoxedStrategy<'a, T> = Box<dyn Strategy<Output = T> + 'a>;

/// Result of a successful chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome<T> {
    /// Name of the strategy that succeeded
    pub strategy: &'static str,
    /// Strategies invoked, including the successful one
    pub attempts: usize,
    pub output: T,
}

/// Run `chain` against `device`
///
/// Fails with `UnsupportedOperation` when no strategy matches the device's
/// capabilities, and with `AllStrategiesExhausted` carrying the last error
/// when every matching strategy failed.
pub async fn run_chain<T: Send>(
    operation: &'static str,
    device: &dyn DeviceApi,
    chain: &[BoxedStrategy<'_, T>],
) -> Result<ChainOutcome<T>, ControlError> {
    let capabilities = device.capabilities();
    let mut attempts = 0;
    let mut last_error = None;

    for strategy in chain {
        if !strategy.is_supported(capabilities) {
            debug!(operation, strategy = strategy.name(), "Strategy not supported, skipping");
            continue;
        }

        attempts += 1;
        debug!(operation, strategy = strategy.name(), attempt = attempts, "Trying strategy");

        match strategy.attempt(device).await {
            Ok(output) => {
                info!(operation, strategy = strategy.name(), "Strategy succeeded");
                return Ok(ChainOutcome {
                    strategy: strategy.name(),
                    attempts,
                    output,
                });
            }
            Err(e) => {
                info!(operation, strategy = strategy.name(), error = %e, "Strategy failed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(last) => {
            warn!(operation, attempts, "All strategies failed");
            Err(ControlError::AllStrategiesExhausted {
                operation,
                attempts,
                last,
            })
        }
        None => {
            warn!(operation, "No strategy matches the device capabilities");
            Err(ControlError::UnsupportedOperation { operation })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        name: &'static str,
        required: &'static [Feature],
        succeed: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Strategy for Scripted {
        type Output = &'static str;

        fn name(&self) -> &'static str {
            self.name
        }

        fn required(&self) -> &'static [Feature] {
            self.required
        }

        async fn attempt(&self, _device: &dyn DeviceApi) -> Result<&'static str, DeviceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(self.name)
            } else {
                Err(DeviceError::Status {
                    status: 500,
                    message: format!("{} failed", self.name),
                })
            }
        }
    }

    fn scripted(
        name: &'static str,
        required: &'static [Feature],
        succeed: bool,
        calls: &Arc<AtomicUsize>,
    ) -> BoxedStrategy<'static, &'static str> {
        Box::new(Scripted {
            name,
            required,
            succeed,
            calls: calls.clone(),
        })
    }

    #[tokio::test]
    async fn test_fail_fail_succeed() {
        let device = MockDevice::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = vec![
            scripted("first", &[], false, &calls),
            scripted("second", &[], false, &calls),
            scripted("third", &[], true, &calls),
            scripted("fourth", &[], true, &calls),
        ];

        let outcome = run_chain("test", &device, &chain).await.unwrap();
        assert_eq!(outcome.output, "third");
        assert_eq!(outcome.strategy, "third");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_carries_last_error() {
        let device = MockDevice::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = vec![
            scripted("first", &[], false, &calls),
            scripted("second", &[], false, &calls),
        ];

        match run_chain("test", &device, &chain).await {
            Err(ControlError::AllStrategiesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 2);
                assert!(last.to_string().contains("second failed"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unsupported_strategies_are_skipped() {
        let device = MockDevice::with_features([Feature::ControlState]);
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = vec![
            scripted("legacy", &[Feature::TransmitState], true, &calls),
            scripted("modern", &[Feature::ControlState], true, &calls),
        ];

        let outcome = run_chain("test", &device, &chain).await.unwrap();
        assert_eq!(outcome.strategy, "modern");
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_no_matching_strategy_is_unsupported() {
        let device = MockDevice::with_features([Feature::ControlState]);
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = vec![scripted("legacy", &[Feature::TransmitState], true, &calls)];

        let err = run_chain("test", &device, &chain).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::UnsupportedOperation { operation: "test" }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
