//! ---
//! oms_section: "03-persistence-logging"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Device status store contract and backends."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod memory;

use async_trait::async_trait;
use r_oms_schema::DeviceState;

/// Result alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for status store backends.
///
/// Every variant is transient from the engine's point of view: the
/// decision cycle retries with backoff and eventually defers to
/// transport-level redelivery.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A read or conditional write exceeded its deadline.
    #[error("store operation timed out: {0}")]
    Timeout(&'static str),
    /// The backend rejected or failed the operation.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Durable last-known-state store, one record per device.
///
/// There is deliberately no unconditional write: delivery is
/// at-least-once and concurrent deliveries for one device are possible,
/// so every mutation must pass the conditional-write check.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Fetch the device's current state, or the `Unknown` initial state
    /// when the device has never been seen. Bounded latency.
    async fn read(&self, device_id: &str) -> Result<DeviceState>;

    /// Atomically replace the device's state if the stored value still
    /// equals `expected`. Returns `false` on conflict; the caller must
    /// re-read rather than re-derive its decision from the stale value.
    async fn compare_and_set(
        &self,
        device_id: &str,
        expected: &DeviceState,
        next: DeviceState,
    ) -> Result<bool>;
}

pub use memory::InMemoryStatusStore;
