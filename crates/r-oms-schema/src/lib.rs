//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Common event schema shared by normalizers and the outage processor."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod event;
pub mod outage;
pub mod state;

/// Shared result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Raised when an inbound payload cannot be turned into a valid event.
///
/// Validation fails closed: no variant here ever results in a state
/// mutation downstream.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The payload was not a JSON object.
    #[error("payload is not a JSON object")]
    NotAnObject,
    /// A required field was absent or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// The source system string did not match any modeled source.
    #[error("unknown source system: {0}")]
    UnknownSourceSystem(String),
    /// The status string did not match any modeled observation.
    #[error("unknown status: {0}")]
    UnknownStatus(String),
    /// The timestamp could not be parsed unambiguously.
    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),
    /// Wrapper for JSON deserialization problems.
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
}

pub use event::{ObservedStatus, SourceSystem, TelemetryEvent};
pub use outage::{OutageNotice, OutagePriority, OutageRecord, OutageStatus, RestorationRecord};
pub use state::{DeviceState, PowerStatus};
