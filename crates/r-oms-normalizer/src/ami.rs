//! ---
//! oms_section: "04-ingest-normalization"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Vendor feed normalizers translating raw payloads to the common schema."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use chrono::Utc;
use r_oms_common::time::parse_timestamp_str;
use r_oms_schema::{ObservedStatus, SourceSystem, TelemetryEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{NormalizeError, Normalizer, Result};

/// Below this reading a meter is considered de-energized.
pub const UNDERVOLTAGE_THRESHOLD_V: f64 = 90.0;

fn default_voltage() -> f64 {
    120.0
}

/// Raw advanced-metering-infrastructure reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAmiReading {
    /// Household meter identifier.
    pub meter_id: String,
    /// Measured service voltage; nominal 120 V when the head-end omits it.
    #[serde(default = "default_voltage")]
    pub voltage: f64,
    /// Automated-meter-reading module status string.
    #[serde(default)]
    pub amr_status: Option<String>,
    /// Source-supplied reading time.
    pub reading_time: String,
    /// Feeder the meter hangs off.
    #[serde(default)]
    pub feeder_id: Option<String>,
}

/// Normalizer for the AMI head-end feed.
///
/// AMI carries no explicit on/off flag; the status is derived from the
/// voltage reading against the undervoltage threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmiNormalizer;

impl Normalizer for AmiNormalizer {
    fn source_system(&self) -> SourceSystem {
        SourceSystem::Ami
    }

    fn normalize(&self, raw: &[u8]) -> Result<TelemetryEvent> {
        let reading: RawAmiReading = serde_json::from_slice(raw)?;
        let status = if reading.voltage < UNDERVOLTAGE_THRESHOLD_V {
            ObservedStatus::Off
        } else {
            ObservedStatus::On
        };
        let event_time = parse_timestamp_str(&reading.reading_time)
            .ok_or_else(|| NormalizeError::InvalidTimestamp(reading.reading_time.clone()))?;

        let mut metadata = BTreeMap::new();
        metadata.insert("voltage".to_owned(), json!(reading.voltage));
        if let Some(amr_status) = &reading.amr_status {
            metadata.insert("amr_status".to_owned(), json!(amr_status));
        }

        Ok(TelemetryEvent {
            event_id: Uuid::new_v4(),
            device_id: reading.meter_id,
            source_system: SourceSystem::Ami,
            status,
            event_time,
            normalized_at: Utc::now(),
            asset_type: "meter".to_owned(),
            network_id: reading.feeder_id.unwrap_or_else(|| "unknown".to_owned()),
            confidence_score: None,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(voltage: f64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "meter_id": "MTR-42",
            "voltage": voltage,
            "amr_status": "no_signal",
            "reading_time": "2024-06-01T12:00:00Z",
            "feeder_id": "FD-12"
        }))
        .expect("serialize")
    }

    #[test]
    fn undervoltage_maps_to_off() {
        let event = AmiNormalizer.normalize(&raw(0.0)).expect("normalizes");
        assert_eq!(event.status, ObservedStatus::Off);
        assert_eq!(event.asset_type, "meter");
        assert_eq!(event.metadata["voltage"], json!(0.0));
    }

    #[test]
    fn threshold_is_exclusive() {
        assert_eq!(
            AmiNormalizer.normalize(&raw(89.9)).unwrap().status,
            ObservedStatus::Off
        );
        assert_eq!(
            AmiNormalizer
                .normalize(&raw(UNDERVOLTAGE_THRESHOLD_V))
                .unwrap()
                .status,
            ObservedStatus::On
        );
    }

    #[test]
    fn missing_voltage_defaults_to_nominal() {
        let bytes = serde_json::to_vec(&json!({
            "meter_id": "MTR-43",
            "reading_time": "2024-06-01 12:00:00"
        }))
        .expect("serialize");
        let event = AmiNormalizer.normalize(&bytes).expect("normalizes");
        assert_eq!(event.status, ObservedStatus::On);
        assert_eq!(event.network_id, "unknown");
    }

    #[test]
    fn missing_meter_id_is_malformed() {
        let bytes = serde_json::to_vec(&json!({
            "voltage": 120.0,
            "reading_time": "2024-06-01T12:00:00Z"
        }))
        .expect("serialize");
        assert!(matches!(
            AmiNormalizer.normalize(&bytes),
            Err(NormalizeError::Json(_))
        ));
    }
}
