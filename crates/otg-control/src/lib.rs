//! OTG Control - Version-adaptive operations against traffic generators
//!
//! This crate turns logical operations into device calls:
//! - Strategy chains that try each historical protocol shape in order
//! - Post-stop verification polling over flow metrics
//! - Capture start, stop and retrieval to pcap files
//! - Per-target connection cache and configured target directory
//! - Concurrent target health checks
//! - `OtgClient`, the operation surface returning structured responses

pub mod cache;
pub mod capture;
pub mod client;
pub mod error;
pub mod health;
pub mod strategy;
pub mod traffic;
pub mod verify;

#[cfg(test)]
mod mock;

pub use cache::{ClientCache, TargetDirectory};
pub use capture::{capture_file_name, CaptureOptions};
pub use client::{OtgClient, DEFAULT_LOCAL_TARGET};
pub use error::ControlError;
pub use health::HealthMonitor;
pub use strategy::{run_chain, ChainOutcome, Strategy};
pub use traffic::StopOutcome;
pub use verify::VerifyOptions;
