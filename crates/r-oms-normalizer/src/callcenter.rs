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

/// Confidence assigned to customer self-reports; unverified by telemetry.
pub const REPORT_CONFIDENCE: f64 = 0.7;

/// Raw outage report captured by a call-center agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCallReport {
    /// Customer account standing in for the affected service point.
    pub customer_account_id: String,
    /// When the call was taken.
    pub call_timestamp: String,
    /// Caller name as entered by the agent.
    #[serde(default)]
    pub caller_name: Option<String>,
    /// Free-text issue description.
    #[serde(default)]
    pub issue_description: Option<String>,
    /// Call duration in seconds.
    #[serde(default)]
    pub call_duration_sec: Option<u64>,
    /// Feeder serving the caller's address, when the agent looked it up.
    #[serde(default)]
    pub service_address_feeder: Option<String>,
}

/// Normalizer for call-center outage reports.
///
/// Every report maps to `OUTAGE_REPORTED`; the engine decides whether
/// telemetry corroborates it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallCenterNormalizer;

impl Normalizer for CallCenterNormalizer {
    fn source_system(&self) -> SourceSystem {
        SourceSystem::CallCenter
    }

    fn normalize(&self, raw: &[u8]) -> Result<TelemetryEvent> {
        let report: RawCallReport = serde_json::from_slice(raw)?;
        let event_time = parse_timestamp_str(&report.call_timestamp)
            .ok_or_else(|| NormalizeError::InvalidTimestamp(report.call_timestamp.clone()))?;

        let mut metadata = BTreeMap::new();
        if let Some(caller_name) = &report.caller_name {
            metadata.insert("caller_name".to_owned(), json!(caller_name));
        }
        if let Some(issue_description) = &report.issue_description {
            metadata.insert("issue_description".to_owned(), json!(issue_description));
        }
        if let Some(call_duration_sec) = report.call_duration_sec {
            metadata.insert("call_duration_sec".to_owned(), json!(call_duration_sec));
        }

        Ok(TelemetryEvent {
            event_id: Uuid::new_v4(),
            device_id: report.customer_account_id,
            source_system: SourceSystem::CallCenter,
            status: ObservedStatus::OutageReported,
            event_time,
            normalized_at: Utc::now(),
            asset_type: "customer".to_owned(),
            network_id: report
                .service_address_feeder
                .unwrap_or_else(|| "unknown".to_owned()),
            confidence_score: Some(REPORT_CONFIDENCE),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_maps_to_outage_reported_with_confidence() {
        let bytes = serde_json::to_vec(&json!({
            "customer_account_id": "ACC-9001",
            "call_timestamp": "2024-06-01T12:05:00Z",
            "caller_name": "A. Resident",
            "issue_description": "whole street is dark",
            "call_duration_sec": 184,
            "service_address_feeder": "FD-12"
        }))
        .expect("serialize");

        let event = CallCenterNormalizer.normalize(&bytes).expect("normalizes");
        assert_eq!(event.status, ObservedStatus::OutageReported);
        assert_eq!(event.source_system, SourceSystem::CallCenter);
        assert_eq!(event.confidence_score, Some(REPORT_CONFIDENCE));
        assert_eq!(event.asset_type, "customer");
        assert_eq!(event.metadata["call_duration_sec"], json!(184));
    }

    #[test]
    fn unparseable_call_timestamp_is_malformed() {
        let bytes = serde_json::to_vec(&json!({
            "customer_account_id": "ACC-9002",
            "call_timestamp": "noonish"
        }))
        .expect("serialize");
        assert!(matches!(
            CallCenterNormalizer.normalize(&bytes),
            Err(NormalizeError::InvalidTimestamp(_))
        ));
    }
}
