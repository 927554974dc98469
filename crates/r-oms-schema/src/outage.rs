//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Common event schema shared by normalizers and the outage processor."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::SourceSystem;

/// Triage priority attached to an outage record.
///
/// AMI-only outages stay distinguishable from SCADA ones because
/// household-meter signal loss has a higher false-positive rate than
/// feeder-level telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutagePriority {
    /// SCADA-confirmed outage.
    Normal,
    /// Opened on AMI evidence alone.
    MeterBased,
    /// Corroborated by a customer report.
    Confirmed,
}

impl OutagePriority {
    /// Wire representation used in payloads and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutagePriority::Normal => "NORMAL",
            OutagePriority::MeterBased => "METER_BASED",
            OutagePriority::Confirmed => "CONFIRMED",
        }
    }
}

/// Lifecycle status carried on an outage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutageStatus {
    /// The episode is open. Records are always emitted active; closure
    /// is a separate restoration signal.
    Active,
}

/// Outage lifecycle record consumed by downstream restoration workflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutageRecord {
    /// Episode identifier, one per outage lifecycle.
    pub outage_id: Uuid,
    /// Affected device.
    pub device_id: String,
    /// The triggering event's occurrence time.
    pub start_time: DateTime<Utc>,
    /// Source that confirmed the outage.
    pub source_system: SourceSystem,
    /// Triage priority.
    pub priority: OutagePriority,
    /// Always `ACTIVE` at creation.
    pub status: OutageStatus,
}

/// Restoration signal emitted when an episode closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorationRecord {
    /// The episode being closed, when the closing state carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outage_id: Option<Uuid>,
    /// Restored device.
    pub device_id: String,
    /// The restoring event's occurrence time.
    pub restored_at: DateTime<Utc>,
    /// Source that observed power back on.
    pub source_system: SourceSystem,
}

/// Outage-lifecycle notice published to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum OutageNotice {
    /// A new episode was opened.
    Created(OutageRecord),
    /// An open episode was corroborated and its priority raised.
    Upgraded(OutageRecord),
    /// An episode closed.
    Restored(RestorationRecord),
}

impl OutageNotice {
    /// Notice kind as a static string for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            OutageNotice::Created(_) => "created",
            OutageNotice::Upgraded(_) => "upgraded",
            OutageNotice::Restored(_) => "restored",
        }
    }

    /// The device the notice concerns.
    pub fn device_id(&self) -> &str {
        match self {
            OutageNotice::Created(record) | OutageNotice::Upgraded(record) => &record.device_id,
            OutageNotice::Restored(record) => &record.device_id,
        }
    }

    /// The episode the notice concerns, when known.
    pub fn outage_id(&self) -> Option<Uuid> {
        match self {
            OutageNotice::Created(record) | OutageNotice::Upgraded(record) => {
                Some(record.outage_id)
            }
            OutageNotice::Restored(record) => record.outage_id,
        }
    }
}
