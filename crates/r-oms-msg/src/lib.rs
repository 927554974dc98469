//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Delivery envelopes and transport abstractions."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod transport;
pub mod types;

/// Shared result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Error enumeration for transport and codec failures.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// Wrapper for JSON serialization or deserialization problems.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper for CBOR serialization or deserialization problems.
    #[error("cbor serialization error: {0}")]
    Cbor(#[from] serde_cbor::Error),
    /// An acknowledgment referenced a lease the transport is not tracking.
    #[error("unknown delivery lease: {0}")]
    UnknownLease(u64),
}

pub use transport::{InMemoryTransport, LeasedDelivery, Transport};
pub use types::Envelope;
