//! ---
//! oms_section: "04-ingest-normalization"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Vendor feed normalizers translating raw payloads to the common schema."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod ami;
pub mod archive;
pub mod callcenter;
pub mod scada;
pub mod service;

use r_oms_schema::{SourceSystem, TelemetryEvent};

/// Shared result type for normalization.
pub type Result<T> = std::result::Result<T, NormalizeError>;

/// Raised when a raw vendor payload cannot be normalized.
///
/// Redelivery cannot fix a structurally bad payload, so every variant
/// maps to log-drop-acknowledge in the service loop.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The payload was not valid JSON or missed a required vendor field.
    #[error("malformed raw payload: {0}")]
    Json(#[from] serde_json::Error),
    /// A status value outside the vendor's vocabulary.
    #[error("unrecognized vendor status: {0}")]
    InvalidStatus(String),
    /// The vendor timestamp could not be parsed unambiguously.
    #[error("unparseable vendor timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Stateless translation from one vendor feed to the common schema.
pub trait Normalizer: Send + Sync {
    /// The source this normalizer fronts.
    fn source_system(&self) -> SourceSystem;
    /// Translate one raw payload. Pure; no I/O.
    fn normalize(&self, raw: &[u8]) -> Result<TelemetryEvent>;
}

pub use ami::{AmiNormalizer, RawAmiReading, UNDERVOLTAGE_THRESHOLD_V};
pub use archive::{ArchiveError, ArchiveSink, JsonlArchive, NullArchive};
pub use callcenter::{CallCenterNormalizer, RawCallReport, REPORT_CONFIDENCE};
pub use scada::{RawScadaEvent, ScadaNormalizer};
pub use service::NormalizerService;
