//! otg - Drive OTG traffic generators from the command line
//!
//! Each subcommand runs one operation and prints its JSON result on stdout.
//! Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use otg_control::OtgClient;
use otg_core::{load_config, SchemaRegistry};
use otg_device::{HttpConnector, DEFAULT_REQUEST_TIMEOUT};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "otg")]
#[command(about = "Version-adaptive control of Open Traffic Generator devices")]
#[command(version)]
struct Args {
    /// Path to target configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Built-in schema directory
    #[arg(long, default_value = "./schemas")]
    schemas_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured targets with availability and API version
    Targets,
    /// Check health of one target, or all configured targets
    Health {
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Show the version report of a target
    Version { target: String },
    /// Get the device configuration
    GetConfig {
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Apply a configuration from a JSON file
    SetConfig {
        file: PathBuf,
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Start traffic on every flow
    StartTraffic {
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Stop traffic and verify it stopped (Ctrl-C skips verification)
    StopTraffic {
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Start packet capture on ports
    StartCapture {
        #[arg(required = true)]
        ports: Vec<String>,
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Stop packet capture on ports
    StopCapture {
        #[arg(required = true)]
        ports: Vec<String>,
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Retrieve a capture as a pcap file
    GetCapture {
        port: String,
        #[arg(short, long)]
        target: Option<String>,
        /// Output directory (default: OS temp directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// File name; `.pcap` is appended when missing
        #[arg(short, long)]
        filename: Option<String>,
    },
    /// Fetch port and flow metrics
    Metrics {
        /// Flow names; pass the flag with no value for all flows
        #[arg(long, num_args = 0.., value_delimiter = ',')]
        flows: Option<Vec<String>>,
        /// Port names; pass the flag with no value for all ports
        #[arg(long, num_args = 0.., value_delimiter = ',')]
        ports: Option<Vec<String>>,
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Look up schema components for a target's API version
    Schemas {
        target: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// List the names under components.schemas for a target
    ListSchemas { target: String },
    /// List the keys under a schema path for a target
    SchemaComponents {
        target: String,
        /// Dot-separated path (default: components.schemas)
        #[arg(short, long)]
        prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("otg v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    info!(
        targets = config.targets.len(),
        schema_path = ?config.schema_path,
        "Configuration loaded"
    );

    let registry = Arc::new(SchemaRegistry::new(
        args.schemas_dir.clone(),
        config.schema_path.clone(),
    ));
    let connector = Arc::new(
        HttpConnector::new(DEFAULT_REQUEST_TIMEOUT).context("Failed to build HTTP client")?,
    );
    let client = OtgClient::new(&config, registry, connector);

    let ok = match args.command {
        Command::Targets => print(&client.get_available_targets().await)?,
        Command::Health { target } => print(&client.health(target.as_deref()).await)?,
        Command::Version { target } => print(&client.get_target_version(&target).await)?,
        Command::GetConfig { target } => print(&client.get_config(target.as_deref()).await)?,
        Command::SetConfig { file, target } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let config: Value = serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", file.display()))?;
            print(&client.set_config(&config, target.as_deref()).await)?
        }
        Command::StartTraffic { target } => {
            print(&client.start_traffic(target.as_deref()).await)?
        }
        Command::StopTraffic { target } => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, skipping stop verification");
                    on_interrupt.cancel();
                }
            });
            print(
                &client
                    .stop_traffic_with_cancel(target.as_deref(), cancel)
                    .await,
            )?
        }
        Command::StartCapture { ports, target } => {
            print(&client.start_capture(&ports, target.as_deref()).await)?
        }
        Command::StopCapture { ports, target } => {
            print(&client.stop_capture(&ports, target.as_deref()).await)?
        }
        Command::GetCapture {
            port,
            target,
            output_dir,
            filename,
        } => print(
            &client
                .get_capture(&port, target.as_deref(), output_dir, filename)
                .await,
        )?,
        Command::Metrics {
            flows,
            ports,
            target,
        } => print(&client.get_metrics(flows, ports, target.as_deref()).await)?,
        Command::Schemas { target, names } => {
            print(&client.get_schemas_for_target(&target, &names).await)?
        }
        Command::ListSchemas { target } => {
            print(&client.list_schemas_for_target(&target).await)?
        }
        Command::SchemaComponents { target, prefix } => print(
            &client
                .get_schema_components_for_target(&target, prefix.as_deref())
                .await,
        )?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Print a response as pretty JSON; returns whether its status is success
fn print<T: Serialize>(response: &T) -> Result<bool> {
    let value = serde_json::to_value(response)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(value.get("status").and_then(Value::as_str) == Some("success"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let result = Args::try_parse_from(["otg", "--log-level", "loud", "targets"]);
        assert!(result.is_err());

        let args = Args::try_parse_from(["otg", "--log-level", "debug", "targets"]).unwrap();
        assert_eq!(args.log_level, Level::DEBUG);
        assert_eq!(args.schemas_dir, PathBuf::from("./schemas"));
    }

    #[test]
    fn test_metrics_scoping_flags() {
        let args = Args::try_parse_from(["otg", "metrics"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Metrics {
                flows: None,
                ports: None,
                ..
            }
        ));

        let args = Args::try_parse_from(["otg", "metrics", "--flows", "--ports", "p1,p2"]).unwrap();
        match args.command {
            Command::Metrics { flows, ports, .. } => {
                assert_eq!(flows, Some(Vec::new()));
                assert_eq!(ports, Some(vec!["p1".to_string(), "p2".to_string()]));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_capture_requires_ports() {
        assert!(Args::try_parse_from(["otg", "start-capture"]).is_err());
        assert!(Args::try_parse_from(["otg", "start-capture", "p1", "-t", "otg:8443"]).is_ok());
    }
}
