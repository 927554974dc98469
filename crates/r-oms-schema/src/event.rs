//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Common event schema shared by normalizers and the outage processor."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use r_oms_common::time::parse_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{Result, SchemaError};

/// Origin of a telemetry observation. Determines authority weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceSystem {
    /// Feeder/transformer level supervisory telemetry.
    Scada,
    /// Household advanced-metering-infrastructure readings.
    Ami,
    /// Customer self-reports captured by call-center agents.
    CallCenter,
}

impl SourceSystem {
    /// Whether an `OFF` observation from this source can open an outage on its own.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, SourceSystem::Scada | SourceSystem::Ami)
    }

    /// Wire representation used in payloads and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSystem::Scada => "SCADA",
            SourceSystem::Ami => "AMI",
            SourceSystem::CallCenter => "CALL_CENTER",
        }
    }
}

impl std::str::FromStr for SourceSystem {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SCADA" => Ok(SourceSystem::Scada),
            "AMI" => Ok(SourceSystem::Ami),
            "CALL_CENTER" => Ok(SourceSystem::CallCenter),
            other => Err(SchemaError::UnknownSourceSystem(other.to_owned())),
        }
    }
}

impl std::fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw observation carried by a normalized event.
///
/// `OUTAGE_REPORTED` is call-center-only and is not an authoritative
/// ON/OFF signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObservedStatus {
    /// Power/service confirmed present.
    On,
    /// Power/service confirmed absent.
    Off,
    /// Customer reported an outage; unverified.
    OutageReported,
}

impl ObservedStatus {
    /// Wire representation used in payloads and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservedStatus::On => "ON",
            ObservedStatus::Off => "OFF",
            ObservedStatus::OutageReported => "OUTAGE_REPORTED",
        }
    }
}

impl std::str::FromStr for ObservedStatus {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ON" => Ok(ObservedStatus::On),
            "OFF" => Ok(ObservedStatus::Off),
            "OUTAGE_REPORTED" => Ok(ObservedStatus::OutageReported),
            other => Err(SchemaError::UnknownStatus(other.to_owned())),
        }
    }
}

impl std::fmt::Display for ObservedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized telemetry event, the pipeline's common schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Identifier assigned by the normalizer, one per normalized event.
    pub event_id: Uuid,
    /// Stable identifier of the monitored asset; primary correlation key.
    pub device_id: String,
    /// Origin of the observation.
    pub source_system: SourceSystem,
    /// Raw observation.
    pub status: ObservedStatus,
    /// When the underlying physical/reported event occurred (source-supplied).
    #[serde(rename = "timestamp")]
    pub event_time: DateTime<Utc>,
    /// Normalizer wall-clock stamp.
    pub normalized_at: DateTime<Utc>,
    /// Asset classification: transformer, meter, customer, or unknown.
    pub asset_type: String,
    /// Feeder identifier the asset hangs off.
    pub network_id: String,
    /// Report confidence; only call-center events carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    /// Opaque passthrough fields, not interpreted by the engine.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, JsonValue>,
}

impl TelemetryEvent {
    /// Decode and validate an inbound JSON payload.
    ///
    /// Required fields are `device_id`, `source_system`, `status`, and
    /// `timestamp`; everything else falls back to defaults or is carried
    /// as passthrough metadata. Fails closed on any violation.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: JsonValue = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Validate a decoded JSON value into an event.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        let JsonValue::Object(mut fields) = value else {
            return Err(SchemaError::NotAnObject);
        };

        let device_id = take_required_string(&mut fields, "device_id")?;
        let source_system: SourceSystem =
            take_required_string(&mut fields, "source_system")?.parse()?;
        let status: ObservedStatus = take_required_string(&mut fields, "status")?.parse()?;
        let timestamp = fields
            .remove("timestamp")
            .ok_or(SchemaError::MissingField("timestamp"))?;
        let event_time = parse_timestamp(&timestamp)
            .ok_or_else(|| SchemaError::InvalidTimestamp(timestamp.to_string()))?;

        let event_id = fields
            .remove("event_id")
            .as_ref()
            .and_then(JsonValue::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .unwrap_or_else(Uuid::new_v4);
        let normalized_at = fields
            .remove("normalized_at")
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let asset_type = take_optional_string(&mut fields, "asset_type")
            .unwrap_or_else(|| "unknown".to_owned());
        let network_id = take_optional_string(&mut fields, "network_id")
            .unwrap_or_else(|| "unknown".to_owned());
        let confidence_score = fields
            .remove("confidence_score")
            .as_ref()
            .and_then(JsonValue::as_f64);

        let mut metadata: BTreeMap<String, JsonValue> = match fields.remove("metadata") {
            Some(JsonValue::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        // Unrecognized top-level fields ride along untouched.
        for (key, value) in fields {
            metadata.entry(key).or_insert(value);
        }

        Ok(Self {
            event_id,
            device_id,
            source_system,
            status,
            event_time,
            normalized_at,
            asset_type,
            network_id,
            confidence_score,
            metadata,
        })
    }
}

fn take_required_string(
    fields: &mut serde_json::Map<String, JsonValue>,
    name: &'static str,
) -> Result<String> {
    match fields.remove(name) {
        Some(JsonValue::String(text)) if !text.trim().is_empty() => Ok(text),
        _ => Err(SchemaError::MissingField(name)),
    }
}

fn take_optional_string(
    fields: &mut serde_json::Map<String, JsonValue>,
    name: &str,
) -> Option<String> {
    match fields.remove(name) {
        Some(JsonValue::String(text)) if !text.trim().is_empty() => Some(text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_payload() -> JsonValue {
        json!({
            "device_id": "TX-001",
            "source_system": "SCADA",
            "status": "OFF",
            "timestamp": "2024-06-01T12:00:00Z"
        })
    }

    #[test]
    fn parses_minimal_payload_with_defaults() {
        let event = TelemetryEvent::from_value(base_payload()).expect("valid");
        assert_eq!(event.device_id, "TX-001");
        assert_eq!(event.source_system, SourceSystem::Scada);
        assert_eq!(event.status, ObservedStatus::Off);
        assert_eq!(event.asset_type, "unknown");
        assert_eq!(event.network_id, "unknown");
        assert!(event.confidence_score.is_none());
    }

    #[test]
    fn missing_device_id_fails_closed() {
        let mut payload = base_payload();
        payload.as_object_mut().unwrap().remove("device_id");
        let err = TelemetryEvent::from_value(payload).expect_err("rejected");
        assert!(matches!(err, SchemaError::MissingField("device_id")));
    }

    #[test]
    fn blank_device_id_counts_as_missing() {
        let mut payload = base_payload();
        payload["device_id"] = json!("   ");
        let err = TelemetryEvent::from_value(payload).expect_err("rejected");
        assert!(matches!(err, SchemaError::MissingField("device_id")));
    }

    #[test]
    fn unknown_source_system_is_rejected() {
        let mut payload = base_payload();
        payload["source_system"] = json!("DRONE_PATROL");
        let err = TelemetryEvent::from_value(payload).expect_err("rejected");
        assert!(matches!(err, SchemaError::UnknownSourceSystem(_)));
    }

    #[test]
    fn unparseable_timestamp_is_rejected() {
        let mut payload = base_payload();
        payload["timestamp"] = json!("last tuesday");
        let err = TelemetryEvent::from_value(payload).expect_err("rejected");
        assert!(matches!(err, SchemaError::InvalidTimestamp(_)));
    }

    #[test]
    fn epoch_timestamp_is_accepted() {
        let mut payload = base_payload();
        payload["timestamp"] = json!(1_717_243_200);
        let event = TelemetryEvent::from_value(payload).expect("valid");
        assert_eq!(event.event_time.timestamp(), 1_717_243_200);
    }

    #[test]
    fn extra_fields_ride_in_metadata() {
        let mut payload = base_payload();
        payload["alarm_code"] = json!("TRF_OUT");
        payload["metadata"] = json!({"voltage": 0.0});
        let event = TelemetryEvent::from_value(payload).expect("valid");
        assert_eq!(event.metadata["alarm_code"], json!("TRF_OUT"));
        assert_eq!(event.metadata["voltage"], json!(0.0));
    }

    #[test]
    fn serialized_event_roundtrips() {
        let event = TelemetryEvent::from_value(base_payload()).expect("valid");
        let bytes = serde_json::to_vec(&event).expect("serialize");
        let back = TelemetryEvent::parse(&bytes).expect("reparse");
        assert_eq!(back, event);
    }
}
