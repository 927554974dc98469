//! ---
//! oms_section: "01-core-functionality"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Outage detection and cross-source correlation state machine."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod engine;
pub mod publisher;
pub mod rules;

use r_oms_store::StoreError;

use crate::publisher::PublishError;

/// Shared result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures surfaced by a decision cycle.
///
/// Every variant is transient: the processor retries with backoff and
/// ultimately defers to transport-level redelivery. Malformed input
/// never reaches the engine, so there is no permanent-failure variant.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The status store timed out or failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The outage publisher timed out or failed after the state write.
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
    /// The conditional write kept conflicting past the retry bound.
    #[error("conditional write conflict persisted after {attempts} attempts")]
    ConflictExhausted {
        /// Re-read attempts performed before giving up.
        attempts: u32,
    },
}

pub use engine::{CorrelationEngine, EngineConfig, Outcome};
pub use publisher::{OutagePublisher, TransportPublisher};
pub use rules::{evaluate, Decision, NoOpReason};
