//! The consolidated status document read by the dashboard.
//!
//! One JSON object maps each service name to its latest result, its bounded
//! history, and a service-specific `extra_info` payload. History statuses keep
//! the per-service encoding the dashboard already expects: tokens
//! (`"SUCCESS"`) for some services, `0`/`1` for others.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::history::ServiceStatus;
use crate::parser::{ParsedEntry, StatusKind, Timestamp};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to write snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Status encoding
// ---------------------------------------------------------------------------

/// How `history[].status` is written for a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusEncoding {
    /// `"SUCCESS"`, `"FAILURE"`, ...
    #[default]
    Token,
    /// `1` for success, `0` otherwise.
    Numeric,
}

impl StatusEncoding {
    pub fn encode(self, status: StatusKind) -> StatusValue {
        match self {
            StatusEncoding::Token => StatusValue::Token(status.as_token().to_string()),
            StatusEncoding::Numeric => StatusValue::Flag(i64::from(status.is_success())),
        }
    }
}

/// A persisted history status in either encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Flag(i64),
    Token(String),
}

impl StatusValue {
    pub fn decode(&self) -> StatusKind {
        match self {
            StatusValue::Flag(1) => StatusKind::Success,
            StatusValue::Flag(_) => StatusKind::Failure,
            StatusValue::Token(token) => StatusKind::from_token(token),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: String,
    pub status: StatusValue,
    #[serde(default)]
    pub extra_info: Value,
}

impl HistoryRecord {
    pub fn from_entry(entry: &ParsedEntry, encoding: StatusEncoding) -> Self {
        Self {
            timestamp: entry.timestamp.to_string(),
            status: encoding.encode(entry.status),
            extra_info: extra_to_value(entry),
        }
    }

    pub fn to_entry(&self) -> ParsedEntry {
        let mut entry = ParsedEntry::new(
            Timestamp::from_persisted(self.timestamp.clone()),
            self.status.decode(),
        );
        if let Value::Object(map) = &self.extra_info {
            for (k, v) in map {
                let value = match v {
                    Value::String(s) => s.clone(),
                    Value::Null => continue,
                    other => other.to_string(),
                };
                entry = entry.with_extra(k, value);
            }
        }
        entry
    }
}

fn extra_to_value(entry: &ParsedEntry) -> Value {
    if entry.extra.is_empty() {
        Value::Null
    } else {
        Value::Object(
            entry
                .extra
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

/// One service's entry in the snapshot document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub timestamp: String,
    pub status: String,
    #[serde(default)]
    pub extra_info: Value,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
    /// Byte offset in the service log up to which lines have been merged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_offset: Option<u64>,
}

impl ServiceRecord {
    pub fn from_status(
        status: &ServiceStatus,
        encoding: StatusEncoding,
        extra_info: Value,
        log_offset: Option<u64>,
    ) -> Self {
        let latest = status.latest();
        Self {
            timestamp: latest.timestamp.to_string(),
            status: latest.status.as_token().to_string(),
            extra_info,
            history: status
                .history()
                .iter()
                .map(|e| HistoryRecord::from_entry(e, encoding))
                .collect(),
            log_offset,
        }
    }

    /// Rebuild the in-memory status.
    ///
    /// Records written before history was tracked carry only a top-level
    /// result; a valid one seeds a single-entry history.
    pub fn to_status(&self, key: &str, limit: usize) -> ServiceStatus {
        if !self.history.is_empty() {
            return ServiceStatus::from_history(
                key,
                self.history.iter().map(HistoryRecord::to_entry),
                limit,
            );
        }
        match Timestamp::parse(&self.timestamp) {
            Ok(ts) => ServiceStatus::from_history(
                key,
                [ParsedEntry::new(ts, StatusKind::from_token(&self.status))],
                limit,
            ),
            Err(_) => ServiceStatus::never_tested(key),
        }
    }
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Service name to record. Ordered so the document serializes identically
/// across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot {
    services: BTreeMap<String, ServiceRecord>,
}

impl StatusSnapshot {
    pub fn get(&self, service: &str) -> Option<&ServiceRecord> {
        self.services.get(service)
    }

    pub fn insert(&mut self, service: impl Into<String>, record: ServiceRecord) {
        self.services.insert(service.into(), record);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ServiceRecord)> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Serialize with the 4-space indentation dashboards have always read.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        buf.push(b'\n');
        Ok(buf)
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Loads and atomically persists the snapshot document at a fixed path.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. A missing, unreadable or corrupt file yields an
    /// empty snapshot; the failure is logged, never returned.
    pub fn load(&self) -> StatusSnapshot {
        let content = match fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot yet, starting empty");
                return StatusSnapshot::default();
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to read snapshot, starting empty"
                );
                return StatusSnapshot::default();
            }
        };

        match serde_json::from_slice(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt snapshot, starting empty");
                StatusSnapshot::default()
            }
        }
    }

    /// Write the snapshot with write-temp-then-rename semantics.
    pub fn persist(&self, snapshot: &StatusSnapshot) -> Result<(), SnapshotError> {
        let content = snapshot.to_json()?;
        super::write_atomic(&self.path, &content).map_err(|source| SnapshotError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), services = snapshot.len(), "snapshot persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::DEFAULT_HISTORY_LIMIT;
    use crate::parser::fields;

    fn sample_status() -> ServiceStatus {
        ServiceStatus::from_history(
            "Dask Gateway",
            vec![
                ParsedEntry::new(
                    Timestamp::parse("2025-01-09 10:12:06").unwrap(),
                    StatusKind::Success,
                ),
                ParsedEntry::new(
                    Timestamp::parse("2025-01-09 11:12:06").unwrap(),
                    StatusKind::Failure,
                )
                    .with_extra(fields::MESSAGE, "connect: refused"),
            ],
            DEFAULT_HISTORY_LIMIT,
        )
    }

    #[test]
    fn test_numeric_encoding() {
        let record = ServiceRecord::from_status(
            &sample_status(),
            StatusEncoding::Numeric,
            Value::Null,
            Some(60),
        );
        assert_eq!(record.timestamp, "2025-01-09 11:12:06");
        assert_eq!(record.status, "FAILURE");
        assert_eq!(record.history[0].status, StatusValue::Flag(1));
        assert_eq!(record.history[1].status, StatusValue::Flag(0));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["history"][0]["status"], 1);
        assert_eq!(json["history"][0]["extra_info"], Value::Null);
        assert_eq!(json["history"][1]["extra_info"]["message"], "connect: refused");
        assert_eq!(json["log_offset"], 60);
    }

    #[test]
    fn test_token_encoding_round_trip() {
        let status = sample_status();
        let record = ServiceRecord::from_status(&status, StatusEncoding::Token, Value::Null, None);
        assert_eq!(record.history[0].status, StatusValue::Token("SUCCESS".into()));
        assert_eq!(record.to_status("Dask Gateway", DEFAULT_HISTORY_LIMIT), status);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("log_offset").is_none());
    }

    #[test]
    fn test_legacy_record_without_history() {
        let record: ServiceRecord = serde_json::from_str(
            r#"{"timestamp": "2025-01-09 10:12:06", "status": "SUCCESS", "extra_info": null}"#,
        )
        .unwrap();
        let status = record.to_status("Dask Gateway", DEFAULT_HISTORY_LIMIT);
        assert_eq!(status.history().len(), 1);
        assert_eq!(status.latest().status, StatusKind::Success);

        let never: ServiceRecord = serde_json::from_str(
            r#"{"timestamp": "Never Tested", "status": "UNKNOWN", "extra_info": null}"#,
        )
        .unwrap();
        assert!(never.to_status("x", DEFAULT_HISTORY_LIMIT).is_never_tested());
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("status_data.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_corrupt_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("status_data.json");
        fs::write(&path, "{\"Dask Gateway\": {\"timestamp\": ").unwrap();
        assert!(SnapshotStore::new(&path).load().is_empty());
    }

    #[test]
    fn test_persist_load_is_byte_stable() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("results/status_data.json"));

        let mut snapshot = StatusSnapshot::default();
        snapshot.insert(
            "Dask Gateway",
            ServiceRecord::from_status(
                &sample_status(),
                StatusEncoding::Numeric,
                Value::Null,
                Some(80),
            ),
        );
        snapshot.insert(
            "STAC API",
            ServiceRecord::from_status(
                &ServiceStatus::never_tested("STAC API"),
                StatusEncoding::Token,
                serde_json::json!({
                    "landsat": {"status": "SUCCESS", "timestamp": "2025-02-11 08:00"}
                }),
                None,
            ),
        );
        store.persist(&snapshot).unwrap();

        store.persist(&store.load()).unwrap();
        let first = fs::read(store.path()).unwrap();
        store.persist(&store.load()).unwrap();
        let second = fs::read(store.path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.load(), snapshot);
    }

    #[test]
    fn test_interrupted_write_keeps_previous_document() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("status_data.json");
        let store = SnapshotStore::new(&path);

        let mut old = StatusSnapshot::default();
        old.insert(
            "Dask Gateway",
            ServiceRecord::from_status(
                &sample_status(),
                StatusEncoding::Numeric,
                Value::Null,
                None,
            ),
        );
        store.persist(&old).unwrap();

        // A run killed between writing its temp file and the rename.
        fs::write(dir.path().join(".status_data.json.tmp.deadbeef"), "{\"Dask Gat").unwrap();

        assert_eq!(store.load(), old);
    }

    #[test]
    fn test_persist_error_is_surfaced() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("results");
        fs::write(&blocker, "not a directory").unwrap();

        let store = SnapshotStore::new(blocker.join("status_data.json"));
        let err = store.persist(&StatusSnapshot::default()).unwrap_err();
        assert!(matches!(err, SnapshotError::Io { .. }));
    }
}
