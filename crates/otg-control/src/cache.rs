//! Connection cache and configured target directory
//!
//! The cache holds one device handle per target. Each target has its own
//! once-cell, so concurrent first calls for a target construct a single
//! handle while other targets proceed independently.

use indexmap::IndexMap;
use otg_core::{Config, PortConfig, TargetConfig};
use otg_device::{Connector, DeviceApi};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::ControlError;

type Slot = Arc<OnceCell<Arc<dyn DeviceApi>>>;

/// Lazily connected device handles keyed by target
#[derive(Debug)]
pub struct ClientCache {
    connector: Arc<dyn Connector>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ClientCache {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Get the handle for `target`, connecting on first use
    ///
    /// A failed connection leaves nothing cached; the next call retries.
    pub async fn get_client(&self, target: &str) -> Result<Arc<dyn DeviceApi>, ControlError> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(target.to_string()).or_default().clone()
        };

        if let Some(device) = slot.get() {
            debug!(target = %target, "Using cached client");
            return Ok(device.clone());
        }

        let device = slot
            .get_or_try_init(|| async {
                info!(target = %target, "Creating client");
                self.connector
                    .connect(target)
                    .await
                    .map_err(|e| ControlError::from_connect(target, e))
            })
            .await?;

        Ok(device.clone())
    }

    /// Drop every cached handle
    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        info!(count = slots.len(), "Clearing client cache");
        slots.clear();
    }

    /// Number of targets with a connected handle
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Configured targets, in configuration order
#[derive(Debug, Clone, Default)]
pub struct TargetDirectory {
    targets: IndexMap<String, TargetConfig>,
}

impl TargetDirectory {
    pub fn new(targets: IndexMap<String, TargetConfig>) -> Self {
        Self { targets }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.targets.clone())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Ports declared for `name`
    pub fn ports(&self, name: &str) -> Option<&IndexMap<String, PortConfig>> {
        self.get(name).map(|target| &target.ports)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TargetConfig)> {
        self.targets.iter().map(|(name, target)| (name.as_str(), target))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
