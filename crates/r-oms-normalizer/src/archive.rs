//! ---
//! oms_section: "03-persistence-logging"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Append-only archive sink for raw and normalized telemetry records."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use r_oms_schema::{SourceSystem, TelemetryEvent};
use serde::{Deserialize, Serialize};

/// Result alias for archive operations.
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Error type for the archive sink.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Wrapper for IO errors while appending records.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Analytical sink for raw and normalized records. Write-only; the
/// pipeline never reads it back.
pub trait ArchiveSink: Send + Sync {
    /// Append one raw vendor payload.
    fn record_raw(&self, source: SourceSystem, payload: &[u8]) -> ArchiveResult<()>;
    /// Append one normalized event.
    fn record_normalized(&self, event: &TelemetryEvent) -> ArchiveResult<()>;
}

/// Row shape for the raw-record table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArchiveRecord {
    /// Ingestion wall-clock stamp.
    pub ingest_timestamp: DateTime<Utc>,
    /// Feed the payload arrived on.
    pub source_system: SourceSystem,
    /// The payload verbatim, lossily decoded for inspection.
    pub raw_data: String,
}

/// Append-only JSONL archive, one file per table.
pub struct JsonlArchive {
    raw: Mutex<BufWriter<File>>,
    normalized: Mutex<BufWriter<File>>,
}

impl JsonlArchive {
    /// Open (or create) the archive files under the given directory.
    pub fn open(directory: &Path) -> ArchiveResult<Self> {
        std::fs::create_dir_all(directory)?;
        let open = |name: &str| -> ArchiveResult<BufWriter<File>> {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(directory.join(name))?;
            Ok(BufWriter::new(file))
        };
        Ok(Self {
            raw: Mutex::new(open("raw_telemetry.jsonl")?),
            normalized: Mutex::new(open("normalized_telemetry.jsonl")?),
        })
    }

    fn append<T: Serialize>(writer: &Mutex<BufWriter<File>>, record: &T) -> ArchiveResult<()> {
        let line = serde_json::to_string(record)?;
        let mut guard = writer.lock();
        guard.write_all(line.as_bytes())?;
        guard.write_all(b"\n")?;
        guard.flush()?;
        Ok(())
    }
}

impl ArchiveSink for JsonlArchive {
    fn record_raw(&self, source: SourceSystem, payload: &[u8]) -> ArchiveResult<()> {
        let record = RawArchiveRecord {
            ingest_timestamp: Utc::now(),
            source_system: source,
            raw_data: String::from_utf8_lossy(payload).into_owned(),
        };
        Self::append(&self.raw, &record)
    }

    fn record_normalized(&self, event: &TelemetryEvent) -> ArchiveResult<()> {
        Self::append(&self.normalized, event)
    }
}

/// Sink for deployments that run without an archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullArchive;

impl ArchiveSink for NullArchive {
    fn record_raw(&self, _source: SourceSystem, _payload: &[u8]) -> ArchiveResult<()> {
        Ok(())
    }

    fn record_normalized(&self, _event: &TelemetryEvent) -> ArchiveResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scada::ScadaNormalizer;
    use crate::Normalizer;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn raw_and_normalized_records_land_in_separate_files() {
        let dir = tempdir().expect("tempdir");
        let archive = JsonlArchive::open(dir.path()).expect("open");

        let payload = serde_json::to_vec(&json!({
            "device_id": "TX-001",
            "status": "OFF",
            "timestamp": "2024-06-01T12:00:00Z"
        }))
        .expect("serialize");
        archive
            .record_raw(SourceSystem::Scada, &payload)
            .expect("raw append");

        let event = ScadaNormalizer.normalize(&payload).expect("normalizes");
        archive.record_normalized(&event).expect("normalized append");

        let raw_lines = std::fs::read_to_string(dir.path().join("raw_telemetry.jsonl"))
            .expect("raw file");
        let record: RawArchiveRecord =
            serde_json::from_str(raw_lines.lines().next().expect("one line")).expect("decodes");
        assert_eq!(record.source_system, SourceSystem::Scada);
        assert!(record.raw_data.contains("TX-001"));

        let normalized_lines =
            std::fs::read_to_string(dir.path().join("normalized_telemetry.jsonl"))
                .expect("normalized file");
        let archived: TelemetryEvent =
            serde_json::from_str(normalized_lines.lines().next().expect("one line"))
                .expect("decodes");
        assert_eq!(archived, event);
    }

    #[test]
    fn appends_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        for _ in 0..2 {
            let archive = JsonlArchive::open(dir.path()).expect("open");
            archive
                .record_raw(SourceSystem::Ami, b"{\"meter_id\":\"MTR-1\"}")
                .expect("append");
        }
        let contents =
            std::fs::read_to_string(dir.path().join("raw_telemetry.jsonl")).expect("file");
        assert_eq!(contents.lines().count(), 2);
    }
}
