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

/// Believed power/service state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerStatus {
    /// Device never observed; the lazy initial state.
    #[default]
    Unknown,
    /// Power confirmed present.
    On,
    /// Power confirmed absent; an episode is open.
    Off,
}

/// Canonical last-known state for one device.
///
/// Owned exclusively by the correlation engine; every mutation goes
/// through the status store's conditional write. Equality is exact so
/// the stored value itself acts as the compare-and-set version check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Current believed state.
    pub status: PowerStatus,
    /// Open episode identifier; set while `status == Off`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_outage_id: Option<Uuid>,
    /// Source that caused the current `Off`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<SourceSystem>,
    /// Bookkeeping stamp; never used for ordering decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl DeviceState {
    /// The state returned for a device that has never been seen.
    pub fn unknown() -> Self {
        Self {
            status: PowerStatus::Unknown,
            active_outage_id: None,
            confirmed_by: None,
            last_update: None,
        }
    }

    /// Whether an episode is currently open.
    pub fn is_off(&self) -> bool {
        self.status == PowerStatus::Off
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::unknown()
    }
}
