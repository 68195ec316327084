//! Success/failure counts over a recent time window of one probe log.

use chrono::{Duration, Local, NaiveDateTime, TimeZone};

use crate::parser::{ParsedEntry, StatusKind};

/// Windowed counts for one service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSummary {
    pub success_count: u64,
    pub failure_count: u64,
    /// Unix seconds of the newest success inside the window.
    pub last_success_unix: Option<i64>,
    /// Status of the chronologically last entry, regardless of the window.
    pub last_status: Option<StatusKind>,
}

impl LogSummary {
    /// Summarize `entries` relative to `now`. Timestamps are probe-local wall
    /// clock time. Only entries strictly newer than `now - window` count, and
    /// only `Success`/`Failure` results are counted.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a ParsedEntry>,
        now: NaiveDateTime,
        window: Duration,
    ) -> Self {
        let cutoff = now.checked_sub_signed(window).unwrap_or(NaiveDateTime::MIN);
        let mut summary = LogSummary::default();

        for entry in entries {
            summary.last_status = Some(entry.status);
            let Some(at) = entry.timestamp.to_naive() else {
                continue;
            };
            if at <= cutoff {
                continue;
            }
            match entry.status {
                StatusKind::Success => {
                    summary.success_count += 1;
                    let unix = local_unix(at);
                    summary.last_success_unix = summary.last_success_unix.max(Some(unix));
                }
                StatusKind::Failure => summary.failure_count += 1,
                _ => {}
            }
        }
        summary
    }

    pub fn total(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// `success / (success + failure)`, 0 when nothing was counted.
    pub fn availability_ratio(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.success_count as f64 / total as f64,
        }
    }

    pub fn last_result_success(&self) -> bool {
        self.last_status == Some(StatusKind::Success)
    }
}

fn local_unix(at: NaiveDateTime) -> i64 {
    Local
        .from_local_datetime(&at)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| at.and_utc().timestamp())
}
