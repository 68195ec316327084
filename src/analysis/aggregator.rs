use std::path::Path;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::{Config, ServiceConfig};
use crate::dedup::CollectionDeduplicator;
use crate::history::{self, ServiceStatus};
use crate::parser::{fields, parser_for, ParsedEntry, ServiceKind, StatusKind, Timestamp};
use crate::scan::{self, LogChunk};
use crate::storage::{ServiceRecord, SnapshotError, SnapshotStore, StatusSnapshot};

/// Outcome of scanning one service log.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub service: String,
    /// Whether the log file existed.
    pub found: bool,
    pub parsed: usize,
    pub skipped: usize,
    pub latest_status: StatusKind,
    pub latest_timestamp: Timestamp,
    pub history_len: usize,
}

/// Owns the snapshot for one load → merge → persist cycle.
pub struct Aggregator {
    store: SnapshotStore,
    snapshot: StatusSnapshot,
    history_limit: usize,
}

impl Aggregator {
    /// Load the current snapshot from `store`.
    pub fn load(store: SnapshotStore, history_limit: usize) -> Self {
        let snapshot = store.load();
        debug!(path = %store.path().display(), services = snapshot.len(), "snapshot loaded");
        Self {
            store,
            snapshot,
            history_limit,
        }
    }

    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    /// Read the new lines of a service log and merge them.
    ///
    /// Only an unreadable (not missing) log is an error.
    pub fn ingest(&mut self, service: &ServiceConfig, log_path: &Path) -> Result<ScanReport> {
        let offset = self
            .snapshot
            .get(&service.name)
            .and_then(|r| r.log_offset)
            .unwrap_or(0);
        let chunk = scan::read_from(log_path, &service.name, offset)?;
        if !chunk.found {
            warn!(service = %service.name, path = %log_path.display(), "log file missing");
        }
        Ok(self.ingest_chunk(service, chunk))
    }

    /// Merge an already read chunk into the snapshot.
    pub fn ingest_chunk(&mut self, service: &ServiceConfig, chunk: LogChunk) -> ScanReport {
        let previous = self.snapshot.get(&service.name).cloned();

        let batch = scan::parse_lines(parser_for(service.kind), chunk.lines);
        if !batch.skipped.is_empty() {
            info!(
                service = %service.name,
                skipped = batch.skipped.len(),
                "skipped malformed log lines"
            );
        }

        let existing = previous
            .as_ref()
            .map(|r| r.to_status(&service.name, self.history_limit))
            .unwrap_or_else(|| ServiceStatus::never_tested(&service.name));
        let parsed = batch.entries.len();
        let extra_info = build_extra_info(
            service.kind,
            previous.as_ref().map(|r| &r.extra_info),
            &batch.entries,
        );
        let status = history::merge(existing, batch.entries, self.history_limit);

        let log_offset = if chunk.found {
            Some(chunk.next_offset)
        } else {
            previous.as_ref().and_then(|r| r.log_offset)
        };

        let extra_info = match extra_info {
            Some(v) => v,
            None => status
                .latest()
                .extra(fields::MESSAGE)
                .map(|m| Value::String(m.to_string()))
                .unwrap_or(Value::Null),
        };

        self.snapshot.insert(
            service.name.clone(),
            ServiceRecord::from_status(&status, service.encoding, extra_info, log_offset),
        );

        ScanReport {
            service: service.name.clone(),
            found: chunk.found,
            parsed,
            skipped: batch.skipped.len(),
            latest_status: status.latest().status,
            latest_timestamp: status.latest().timestamp.clone(),
            history_len: status.history().len(),
        }
    }

    /// Give a service without any record the "Never Tested" sentinel so the
    /// dashboard lists it even when its log could not be read.
    pub fn ensure_listed(&mut self, service: &ServiceConfig) {
        if self.snapshot.get(&service.name).is_none() {
            let status = ServiceStatus::never_tested(&service.name);
            self.snapshot.insert(
                service.name.clone(),
                ServiceRecord::from_status(&status, service.encoding, Value::Null, None),
            );
        }
    }

    /// Write the merged snapshot back atomically.
    pub fn persist(&self) -> Result<(), SnapshotError> {
        self.store.persist(&self.snapshot)
    }
}

/// Scan every configured service and persist the result.
///
/// A service whose log cannot be read is logged and left unchanged (or
/// listed as never tested); only a failed snapshot write fails the run.
pub fn run(config: &Config) -> Result<Vec<ScanReport>> {
    let store = SnapshotStore::new(&config.paths.output);
    let mut aggregator = Aggregator::load(store, config.history.limit);

    let mut reports = Vec::with_capacity(config.services.len());
    for service in &config.services {
        let path = config.log_path(service);
        match aggregator.ingest(service, &path) {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!(service = %service.name, error = %e, "failed to scan service log");
                aggregator.ensure_listed(service);
            }
        }
    }

    aggregator.persist()?;
    Ok(reports)
}

// ---------------------------------------------------------------------------
// extra_info
// ---------------------------------------------------------------------------

/// Service-specific `extra_info`, or `None` for single-result services which
/// fall back to the latest message.
fn build_extra_info(
    kind: ServiceKind,
    previous: Option<&Value>,
    entries: &[ParsedEntry],
) -> Option<Value> {
    match kind {
        ServiceKind::Stac | ServiceKind::OpenEo => {
            let mut dedup = CollectionDeduplicator::by_field(fields::COLLECTION);
            if let Some(Value::Object(map)) = previous {
                dedup.extend(
                    map.iter()
                        .filter_map(|(id, v)| entry_from_object(fields::COLLECTION, id, v)),
                );
            }
            dedup.extend(entries.iter().cloned());
            if dedup.is_empty() {
                return Some(Value::Null);
            }
            let collections = dedup
                .into_sorted()
                .into_iter()
                .map(|(id, entry)| (id, Value::Object(entry_object(&entry, &[fields::COLLECTION]))))
                .collect::<Map<_, _>>();
            Some(Value::Object(collections))
        }
        ServiceKind::Notebook => {
            let mut dedup = CollectionDeduplicator::by_field(fields::NOTEBOOK);
            if let Some(Value::Array(items)) = previous {
                dedup.extend(items.iter().filter_map(|v| {
                    let path = v.get(fields::NOTEBOOK)?.as_str()?;
                    entry_from_object(fields::NOTEBOOK, path, v)
                }));
            }
            dedup.extend(entries.iter().cloned());
            if dedup.is_empty() {
                return Some(Value::Null);
            }
            let notebooks = dedup
                .into_sorted()
                .into_values()
                .map(|entry| Value::Object(entry_object(&entry, &[])))
                .collect();
            Some(Value::Array(notebooks))
        }
        ServiceKind::Dask | ServiceKind::OpenStack => None,
    }
}

/// `{timestamp, status, <extra fields>}` minus the fields in `skip`.
fn entry_object(entry: &ParsedEntry, skip: &[&str]) -> Map<String, Value> {
    let mut obj = Map::new();
    obj.insert("timestamp".into(), Value::String(entry.timestamp.to_string()));
    obj.insert("status".into(), Value::String(entry.status.as_token().to_string()));
    for (k, v) in &entry.extra {
        if !skip.contains(&k.as_str()) {
            obj.insert(k.clone(), Value::String(v.clone()));
        }
    }
    obj
}

fn entry_from_object(key_field: &str, id: &str, value: &Value) -> Option<ParsedEntry> {
    let obj = value.as_object()?;
    let timestamp = Timestamp::from_persisted(obj.get("timestamp")?.as_str()?);
    let status = StatusKind::from_token(obj.get("status")?.as_str()?);
    let mut entry = ParsedEntry::new(timestamp, status).with_extra(key_field, id);
    for (k, v) in obj {
        if k == "timestamp" || k == "status" || k == key_field {
            continue;
        }
        if let Some(s) = v.as_str() {
            entry = entry.with_extra(k, s);
        }
    }
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::RawLogLine;
    use crate::storage::StatusEncoding;

    fn chunk(lines: &[&str]) -> LogChunk {
        let mut offset = 0;
        let lines = lines
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let line = RawLogLine {
                    service: "test".into(),
                    line_no: i + 1,
                    offset,
                    text: text.to_string(),
                };
                offset += text.len() as u64 + 1;
                line
            })
            .collect();
        LogChunk {
            lines,
            next_offset: offset,
            found: true,
            rewound: false,
        }
    }

    fn aggregator(dir: &tempfile::TempDir) -> Aggregator {
        Aggregator::load(SnapshotStore::new(dir.path().join("status.json")), 100)
    }

    #[test]
    fn test_missing_log_gives_sentinel() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut agg = aggregator(&dir);
        let svc = ServiceConfig::new(
            "Dask Gateway",
            ServiceKind::Dask,
            "x.log",
            StatusEncoding::Numeric,
        );

        let report = agg.ingest(&svc, &dir.path().join("x.log")).unwrap();
        assert!(!report.found);
        assert_eq!(report.latest_status, StatusKind::Unknown);

        let record = agg.snapshot().get("Dask Gateway").unwrap();
        assert_eq!(record.timestamp, "Never Tested");
        assert_eq!(record.status, "UNKNOWN");
        assert!(record.history.is_empty());
        assert_eq!(record.extra_info, Value::Null);
        assert_eq!(record.log_offset, None);
    }

    #[test]
    fn test_dask_message_becomes_extra_info() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut agg = aggregator(&dir);
        let svc = ServiceConfig::new(
            "Dask Gateway",
            ServiceKind::Dask,
            "x.log",
            StatusEncoding::Numeric,
        );

        let report = agg.ingest_chunk(
            &svc,
            chunk(&[
                "2025-01-09 10:12:06 - SUCCESS",
                "garbage",
                "2025-01-09 11:12:06 - FAILURE - compute: KilledWorker",
            ]),
        );
        assert_eq!(report.parsed, 2);
        assert_eq!(report.skipped, 1);

        let record = agg.snapshot().get("Dask Gateway").unwrap();
        assert_eq!(record.status, "FAILURE");
        assert_eq!(record.extra_info, Value::String("compute: KilledWorker".into()));
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["history"][0]["status"], 1);
        assert_eq!(json["history"][1]["status"], 0);
    }

    #[test]
    fn test_stac_collections_merge_across_runs() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut agg = aggregator(&dir);
        let svc = ServiceConfig::new("STAC API", ServiceKind::Stac, "x.log", StatusEncoding::Token);

        agg.ingest_chunk(
            &svc,
            chunk(&[
                "2025-02-11 08:00, SUCCESS, collection: sentinel-2, item: a",
                "2025-02-11 08:00, FAILURE, collection: landsat, item: b, reason: HTTP 500",
            ]),
        );
        agg.persist().unwrap();

        let mut agg = aggregator(&dir);
        agg.ingest_chunk(
            &svc,
            chunk(&["2025-02-11 09:00, SUCCESS, collection: landsat, item: c"]),
        );

        let record = agg.snapshot().get("STAC API").unwrap();
        let collections = record.extra_info.as_object().unwrap();
        assert_eq!(collections.len(), 2);
        assert_eq!(collections["landsat"]["status"], "SUCCESS");
        assert_eq!(collections["landsat"]["item"], "c");
        assert!(collections["landsat"].get("reason").is_none());
        assert_eq!(collections["sentinel-2"]["timestamp"], "2025-02-11 08:00");
        assert_eq!(record.history.len(), 3);
        assert_eq!(record.history[2].status, crate::storage::StatusValue::Token("SUCCESS".into()));
    }

    #[test]
    fn test_notebooks_keep_latest_per_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut agg = aggregator(&dir);
        let svc = ServiceConfig::new(
            "Notebooks",
            ServiceKind::Notebook,
            "x.log",
            StatusEncoding::Token,
        );

        agg.ingest_chunk(
            &svc,
            chunk(&[
                "2025-01-09 10:12:06 - FAILURE - Import Error: xarray - demos/b.ipynb",
                "2025-01-09 10:12:07 - SUCCESS - demos/a.ipynb",
                "2025-01-10 10:12:06 - SUCCESS - demos/b.ipynb",
            ]),
        );

        let record = agg.snapshot().get("Notebooks").unwrap();
        let notebooks = record.extra_info.as_array().unwrap();
        assert_eq!(notebooks.len(), 2);
        assert_eq!(notebooks[0]["notebook"], "demos/a.ipynb");
        assert_eq!(notebooks[1]["notebook"], "demos/b.ipynb");
        assert_eq!(notebooks[1]["status"], "SUCCESS");
        assert!(notebooks[1].get("error").is_none());
    }

    #[test]
    fn test_history_bounded_across_runs() {
        let dir = tempfile::TempDir::new().unwrap();
        let svc = ServiceConfig::new(
            "OpenStack",
            ServiceKind::OpenStack,
            "x.log",
            StatusEncoding::Numeric,
        );

        for run in 0..3 {
            let mut agg = aggregator(&dir);
            let lines: Vec<String> = (0..60)
                .map(|i| {
                    format!(
                        "2025-03-{:02} {:02}:{:02}, SUCCESS, vm-{run}-{i}",
                        run + 1,
                        i / 60,
                        i % 60
                    )
                })
                .collect();
            let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
            agg.ingest_chunk(&svc, chunk(&refs));
            agg.persist().unwrap();
        }

        let agg = aggregator(&dir);
        let record = agg.snapshot().get("OpenStack").unwrap();
        assert_eq!(record.history.len(), 100);
        assert_eq!(record.history[0].timestamp, "2025-03-02 00:20");
        assert_eq!(record.timestamp, "2025-03-03 00:59");
        assert_eq!(record.extra_info, Value::String("vm-2-59".into()));
    }

    #[test]
    fn test_unreadable_log_still_listed() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.log_dir = dir.path().join("logs");
        config.paths.output = dir.path().join("status.json");
        config.services = vec![ServiceConfig::new(
            "OpenStack",
            ServiceKind::OpenStack,
            "test_openstack.log",
            StatusEncoding::Numeric,
        )];
        // A directory where the log should be: opens, but cannot be read.
        std::fs::create_dir_all(config.paths.log_dir.join("test_openstack.log")).unwrap();

        let reports = run(&config).unwrap();
        assert!(reports.is_empty());

        let snapshot = SnapshotStore::new(&config.paths.output).load();
        let record = snapshot.get("OpenStack").unwrap();
        assert_eq!(record.timestamp, "Never Tested");
        assert_eq!(record.status, "UNKNOWN");
        assert!(record.history.is_empty());
    }
}
