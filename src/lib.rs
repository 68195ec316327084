//! e2e-dashboard -- consolidated status for end-to-end service probes.
//!
//! Probes append one status line per check to plain-text logs. This crate
//! parses those logs, keeps a bounded per-service history in a JSON snapshot
//! the dashboard reads, and pushes point-in-time gauges to a Prometheus
//! Pushgateway.

pub mod analysis;
pub mod config;
pub mod dedup;
pub mod history;
pub mod metrics;
pub mod parser;
pub mod scan;
pub mod storage;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};

use analysis::{LogSummary, ScanReport};
use config::Config;
use parser::{parser_for, ServiceKind};

/// Scan every configured service log and persist the merged snapshot.
pub fn aggregate(config: &Config) -> Result<Vec<ScanReport>> {
    tracing::info!(
        services = config.services.len(),
        output = %config.paths.output.display(),
        "aggregating probe logs"
    );
    analysis::aggregator::run(config)
}

/// Windowed success/failure counts over a whole log file.
///
/// A missing log yields an empty summary.
pub fn summarize_log(
    path: &Path,
    kind: ServiceKind,
    now: NaiveDateTime,
    window: Duration,
) -> Result<LogSummary> {
    let chunk = scan::read_from(path, &kind.to_string(), 0)
        .with_context(|| format!("failed to read log {}", path.display()))?;
    if !chunk.found {
        tracing::warn!(path = %path.display(), "log file missing, summary is empty");
    }
    let batch = scan::parse_lines(parser_for(kind), chunk.lines);
    Ok(LogSummary::from_entries(&batch.entries, now, window))
}
