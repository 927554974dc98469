//! ---
//! oms_section: "02-messaging-ipc-data-model"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Delivery envelopes and transport abstractions."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Delivery envelope carried on every transport.
///
/// The payload travels as opaque bytes; decoding into a typed event is
/// the consumer's concern so that malformed payloads reach the
/// consumer's drop policy instead of poisoning the transport. On the
/// wire the bytes are base64-encoded, matching the push-delivery shape
/// upstream feeds use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique identifier for deduplication and tracing.
    pub id: Uuid,
    /// Timestamp when the envelope was published.
    pub published_at: DateTime<Utc>,
    /// Delivery attempt counter; zero on first delivery.
    #[serde(default)]
    pub attempt: u32,
    /// Opaque payload bytes, base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Envelope {
    /// Wrap raw payload bytes in a fresh envelope.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            published_at: Utc::now(),
            attempt: 0,
            data,
        }
    }

    /// Serialize a payload as JSON and wrap it.
    pub fn json<T: Serialize>(payload: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_vec(payload)?))
    }

    /// Encode the envelope itself with the compact CBOR codec.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        Ok(serde_cbor::to_vec(self)?)
    }

    /// Decode an envelope from its CBOR form.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        Ok(serde_cbor::from_slice(bytes)?)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_wire_form_carries_base64_data() {
        let envelope = Envelope::new(b"{\"device_id\":\"TX-001\"}".to_vec());
        let wire = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(wire["data"], json!("eyJkZXZpY2VfaWQiOiJUWC0wMDEifQ=="));

        let back: Envelope = serde_json::from_value(wire).expect("deserialize");
        assert_eq!(back, envelope);
    }

    #[test]
    fn cbor_roundtrip_preserves_payload() {
        let envelope = Envelope::json(&json!({"status": "OFF"})).expect("wrap");
        let bytes = envelope.to_cbor().expect("encode");
        let back = Envelope::from_cbor(&bytes).expect("decode");
        assert_eq!(back, envelope);
    }

    #[test]
    fn attempt_defaults_to_zero_on_the_wire() {
        let wire = json!({
            "id": "6dd7ed44-5bc7-4c5c-8a63-6d04f65fdd5e",
            "published_at": "2024-06-01T12:00:00Z",
            "data": ""
        });
        let envelope: Envelope = serde_json::from_value(wire).expect("deserialize");
        assert_eq!(envelope.attempt, 0);
        assert!(envelope.data.is_empty());
    }
}
