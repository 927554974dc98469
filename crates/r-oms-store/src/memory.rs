//! ---
//! oms_section: "03-persistence-logging"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Device status store contract and backends."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use r_oms_schema::DeviceState;

use crate::{Result, StatusStore};

/// Mutex-protected map backend for single-instance deployments and tests.
///
/// The map entry is the whole version check: `compare_and_set` holds the
/// lock across the equality test and the write, so the check-then-act is
/// atomic with respect to every other writer.
#[derive(Clone, Default)]
pub struct InMemoryStatusStore {
    devices: Arc<Mutex<HashMap<String, DeviceState>>>,
}

impl InMemoryStatusStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of devices with recorded state.
    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }

    /// Snapshot a device's stored state without going through the trait.
    pub fn snapshot(&self, device_id: &str) -> Option<DeviceState> {
        self.devices.lock().get(device_id).cloned()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn read(&self, device_id: &str) -> Result<DeviceState> {
        let guard = self.devices.lock();
        Ok(guard
            .get(device_id)
            .cloned()
            .unwrap_or_else(DeviceState::unknown))
    }

    async fn compare_and_set(
        &self,
        device_id: &str,
        expected: &DeviceState,
        next: DeviceState,
    ) -> Result<bool> {
        let mut guard = self.devices.lock();
        let current = guard
            .get(device_id)
            .cloned()
            .unwrap_or_else(DeviceState::unknown);
        if &current != expected {
            return Ok(false);
        }
        guard.insert(device_id.to_owned(), next);
        Ok(true)
    }
}
