use otg_core::SchemaError;
use otg_device::DeviceError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Target {target} unreachable: {message}")]
    TargetUnreachable { target: String, message: String },
    #[error("Operation {operation} is not supported by the device")]
    UnsupportedOperation { operation: &'static str },
    #[error("All {attempts} strategies for {operation} failed, last error: {last}")]
    AllStrategiesExhausted {
        operation: &'static str,
        attempts: usize,
        #[source]
        last: DeviceError,
    },
    #[error("Traffic did not stop within {0:?}")]
    VerificationTimeout(Duration),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Target {0} not found")]
    UnknownTarget(String),
    #[error("No ports given for {operation}")]
    NoPorts { operation: &'static str },
    #[error("Invalid capture file name {0:?}: must be a bare file name")]
    InvalidFileName(String),
}

impl ControlError {
    /// Classify a connection failure for `target`
    pub fn from_connect(target: &str, error: DeviceError) -> Self {
        match error {
            DeviceError::Unreachable(message) => ControlError::TargetUnreachable {
                target: target.to_string(),
                message,
            },
            other => ControlError::Device(other),
        }
    }
}
