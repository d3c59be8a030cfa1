//! Target health checks
//!
//! A target is healthy when it answers its version report. Targets are
//! checked concurrently.

use otg_core::{HealthStatus, Status, TargetHealthInfo};
use otg_device::Connector;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    connector: Arc<dyn Connector>,
}

impl HealthMonitor {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Check one target
    pub async fn check_target(&self, target: &str) -> TargetHealthInfo {
        check(self.connector.clone(), target.to_string()).await
    }

    /// Check every listed target
    ///
    /// Status is success only when the set is non-empty and every target is
    /// healthy. Records keep the order in which targets were given.
    pub async fn check_all<I, S>(&self, targets: I) -> HealthStatus
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tasks = JoinSet::new();
        let mut expected = 0;

        for (index, target) in targets.into_iter().enumerate() {
            expected += 1;
            let pending = check(self.connector.clone(), target.into());
            tasks.spawn(async move { (index, pending.await) });
        }

        let mut slots: Vec<Option<TargetHealthInfo>> = vec![None; expected];
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok((index, info)) => slots[index] = Some(info),
                Err(e) => warn!(error = %e, "Health check task failed"),
            }
        }

        let records: Vec<TargetHealthInfo> = slots.into_iter().flatten().collect();
        let checked = records.len();
        let mut status = HealthStatus::from_records(records);
        if checked < expected {
            status.status = Status::Error;
        }

        info!(
            targets = expected,
            healthy = status.targets.values().filter(|t| t.healthy).count(),
            "Health check complete"
        );
        status
    }
}

async fn check(connector: Arc<dyn Connector>, target: String) -> TargetHealthInfo {
    debug!(target = %target, "Requesting version report");
    match connector.version(&target).await {
        Ok(version) => {
            debug!(target = %target, sdk_version = %version.sdk_version, "Target is healthy");
            TargetHealthInfo {
                name: target,
                healthy: true,
                version_info: Some(version),
                error: None,
            }
        }
        Err(e) => {
            warn!(target = %target, error = %e, "Target is unhealthy");
            TargetHealthInfo {
                name: target,
                healthy: false,
                version_info: None,
                error: Some(e.to_string()),
            }
        }
    }
}
