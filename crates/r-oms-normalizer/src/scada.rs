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

/// Raw SCADA telemetry frame as emitted at the feeder/transformer level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawScadaEvent {
    /// Transformer or feeder asset identifier.
    pub device_id: String,
    /// `ON`/`OFF`, or the field-unit `UP`/`DOWN` aliases.
    pub status: String,
    /// Source-supplied occurrence time.
    pub timestamp: String,
    /// Asset classification when the RTU reports one.
    #[serde(default)]
    pub device_type: Option<String>,
    /// Feeder the asset hangs off.
    #[serde(default)]
    pub feeder_id: Option<String>,
    /// Substation identifier.
    #[serde(default)]
    pub substation: Option<String>,
    /// Measured voltage in kilovolts.
    #[serde(default)]
    pub voltage_kv: Option<f64>,
    /// Measured current in amperes.
    #[serde(default)]
    pub current_a: Option<f64>,
    /// Active alarm code, if any.
    #[serde(default)]
    pub alarm_code: Option<String>,
}

/// Normalizer for the SCADA feed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScadaNormalizer;

impl Normalizer for ScadaNormalizer {
    fn source_system(&self) -> SourceSystem {
        SourceSystem::Scada
    }

    fn normalize(&self, raw: &[u8]) -> Result<TelemetryEvent> {
        let frame: RawScadaEvent = serde_json::from_slice(raw)?;
        let status = match frame.status.as_str() {
            "ON" | "UP" => ObservedStatus::On,
            "OFF" | "DOWN" => ObservedStatus::Off,
            other => return Err(NormalizeError::InvalidStatus(other.to_owned())),
        };
        let event_time = parse_timestamp_str(&frame.timestamp)
            .ok_or_else(|| NormalizeError::InvalidTimestamp(frame.timestamp.clone()))?;

        let mut metadata = BTreeMap::new();
        if let Some(substation) = &frame.substation {
            metadata.insert("substation".to_owned(), json!(substation));
        }
        if let Some(voltage_kv) = frame.voltage_kv {
            metadata.insert("voltage_kv".to_owned(), json!(voltage_kv));
        }
        if let Some(current_a) = frame.current_a {
            metadata.insert("current_a".to_owned(), json!(current_a));
        }
        if let Some(alarm_code) = &frame.alarm_code {
            metadata.insert("alarm_code".to_owned(), json!(alarm_code));
        }

        Ok(TelemetryEvent {
            event_id: Uuid::new_v4(),
            device_id: frame.device_id,
            source_system: SourceSystem::Scada,
            status,
            event_time,
            normalized_at: Utc::now(),
            asset_type: frame.device_type.unwrap_or_else(|| "unknown".to_owned()),
            network_id: frame
                .feeder_id
                .unwrap_or_else(|| "default_feeder".to_owned()),
            confidence_score: None,
            metadata,
        })
    }
}
