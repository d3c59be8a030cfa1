//! Packet capture chains and pcap output

use async_trait::async_trait;
use otg_core::CaptureJob;
use otg_device::{
    CaptureAction, CaptureRequest, CaptureStateRequest, ControlState, DeviceApi, DeviceError,
    Feature,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ControlError;
use crate::strategy::{run_chain, BoxedStrategy, ChainOutcome, Strategy};

const PCAP_EXTENSION: &str = ".pcap";

/// Where and under which name a retrieved capture is written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Defaults to the OS temp directory
    pub output_dir: Option<PathBuf>,
    /// Defaults to a generated `capture_<port>_<id>.pcap`
    pub filename: Option<String>,
}

impl CaptureOptions {
    fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// File name for a capture of `port`
///
/// Without a name, one is generated from the port and 8 random hex digits.
/// A given name without a `.pcap` suffix gets one appended. Given names must
/// be bare file names so the capture stays inside the output directory.
pub fn capture_file_name(port: &str, filename: Option<&str>) -> Result<String, ControlError> {
    match filename {
        Some(name) if !is_bare_file_name(name) => {
            Err(ControlError::InvalidFileName(name.to_string()))
        }
        Some(name) if name.ends_with(PCAP_EXTENSION) => Ok(name.to_string()),
        Some(name) => Ok(format!("{}{}", name, PCAP_EXTENSION)),
        None => {
            let id = Uuid::new_v4().simple().to_string();
            Ok(format!("capture_{}_{}{}", port, &id[..8], PCAP_EXTENSION))
        }
    }
}

fn is_bare_file_name(name: &str) -> bool {
    !name.contains(['/', '\\'])
        && Path::new(name).file_name() == Some(OsStr::new(name))
}

/// Capture-state object covering all ports in one call
struct CaptureStateCall {
    action: CaptureAction,
    ports: Vec<String>,
}

#[async_trait]
impl Strategy for CaptureStateCall {
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        "capture_state"
    }

    fn required(&self) -> &'static [Feature] {
        &[Feature::CaptureState]
    }

    async fn attempt(&self, device: &dyn DeviceApi) -> Result<Vec<String>, DeviceError> {
        let request = CaptureStateRequest {
            state: self.action,
            port_names: self.ports.clone(),
        };
        Ok(device.set_capture_state(&request).await?.warnings)
    }
}

/// One start_capture / stop_capture call per port
struct PerPortCapture {
    action: CaptureAction,
    ports: Vec<String>,
}

#[async_trait]
impl Strategy for PerPortCapture {
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        match self.action {
            CaptureAction::Start => "start_capture",
            CaptureAction::Stop => "stop_capture",
        }
    }

    fn required(&self) -> &'static [Feature] {
        match self.action {
            CaptureAction::Start => &[Feature::StartCapture],
            CaptureAction::Stop => &[Feature::StopCapture],
        }
    }

    async fn attempt(&self, device: &dyn DeviceApi) -> Result<Vec<String>, DeviceError> {
        let mut warnings = Vec::new();
        for port in &self.ports {
            let reply = match self.action {
                CaptureAction::Start => device.start_capture(port).await?,
                CaptureAction::Stop => device.stop_capture(port).await?,
            };
            warnings.extend(reply.warnings);
        }
        Ok(warnings)
    }
}

/// port / capture control-state object
struct CaptureControlState {
    action: CaptureAction,
    ports: Vec<String>,
}

#[async_trait]
impl Strategy for CaptureControlState {
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        "control_state"
    }

    fn required(&self) -> &'static [Feature] {
        &[Feature::ControlState]
    }

    async fn attempt(&self, device: &dyn DeviceApi) -> Result<Vec<String>, DeviceError> {
        let state = ControlState::PortCapture {
            state: self.action,
            port_names: self.ports.clone(),
        };
        Ok(device.set_control_state(&state).await?.warnings)
    }
}

/// capture_request + get_capture, binary reply
struct CaptureRequestCall {
    port: String,
}

#[async_trait]
impl Strategy for CaptureRequestCall {
    type Output = Vec<u8>;

    fn name(&self) -> &'static str {
        "get_capture"
    }

    fn required(&self) -> &'static [Feature] {
        &[Feature::CaptureRequest, Feature::GetCapture]
    }

    async fn attempt(&self, device: &dyn DeviceApi) -> Result<Vec<u8>, DeviceError> {
        let request = CaptureRequest {
            port_name: self.port.clone(),
        };
        device.get_capture(&request).await
    }
}

/// capture / retrieve control-state object carrying base64 bytes
struct CaptureRetrieveControlState {
    port: String,
}

#[async_trait]
impl Strategy for CaptureRetrieveControlState {
    type Output = Vec<u8>;

    fn name(&self) -> &'static str {
        "control_state"
    }

    fn required(&self) -> &'static [Feature] {
        &[Feature::ControlState]
    }

    async fn attempt(&self, device: &dyn DeviceApi) -> Result<Vec<u8>, DeviceError> {
        let state = ControlState::CaptureRetrieve {
            port_name: self.port.clone(),
        };
        device.set_control_state(&state).await?.capture_bytes(&self.port)
    }
}

fn state_chain(action: CaptureAction, ports: &[String]) -> Vec<BoxedStrategy<'static, Vec<String>>> {
    vec![
        Box::new(CaptureStateCall {
            action,
            ports: ports.to_vec(),
        }),
        Box::new(PerPortCapture {
            action,
            ports: ports.to_vec(),
        }),
        Box::new(CaptureControlState {
            action,
            ports: ports.to_vec(),
        }),
    ]
}

/// Start or stop capture on `ports`, returning device warnings
pub async fn set_capture(
    device: &dyn DeviceApi,
    action: CaptureAction,
    ports: &[String],
) -> Result<ChainOutcome<Vec<String>>, ControlError> {
    info!(action = action.as_str(), ports = ?ports, "Setting capture state");
    let operation = match action {
        CaptureAction::Start => "start_capture",
        CaptureAction::Stop => "stop_capture",
    };
    if ports.is_empty() {
        return Err(ControlError::NoPorts { operation });
    }
    run_chain(operation, device, &state_chain(action, ports)).await
}

/// Retrieve a port's capture and write it to disk
pub async fn retrieve_capture(
    device: &dyn DeviceApi,
    port: &str,
    options: &CaptureOptions,
) -> Result<ChainOutcome<CaptureJob>, ControlError> {
    info!(port = %port, "Retrieving capture");
    let file_name = capture_file_name(port, options.filename.as_deref())?;
    let chain: Vec<BoxedStrategy<'static, Vec<u8>>> = vec![
        Box::new(CaptureRequestCall {
            port: port.to_string(),
        }),
        Box::new(CaptureRetrieveControlState {
            port: port.to_string(),
        }),
    ];
    let outcome = run_chain("get_capture", device, &chain).await?;

    let job = write_capture(port, &outcome.output, &options.output_dir(), file_name).await?;
    Ok(ChainOutcome {
        strategy: outcome.strategy,
        attempts: outcome.attempts,
        output: job,
    })
}

/// Write capture bytes verbatim, creating the output directory when missing
pub async fn write_capture(
    port: &str,
    bytes: &[u8],
    output_dir: &Path,
    file_name: String,
) -> Result<CaptureJob, ControlError> {
    tokio::fs::create_dir_all(output_dir).await?;

    let file_path = output_dir.join(&file_name);
    debug!(path = %file_path.display(), size = bytes.len(), "Writing capture file");
    tokio::fs::write(&file_path, bytes).await?;

    let size_bytes = file_size(&file_path).await?;
    info!(port = %port, path = %file_path.display(), size = size_bytes, "Capture saved");

    Ok(CaptureJob {
        port: port.to_string(),
        file_name,
        file_path,
        size_bytes,
    })
}

async fn file_size(path: &Path) -> Result<u64, ControlError> {
    Ok(tokio::fs::metadata(path).await?.len())
}
