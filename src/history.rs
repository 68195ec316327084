//! Bounded per-service result history.

use std::collections::VecDeque;

use crate::parser::ParsedEntry;

/// Number of entries retained per service.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Latest result plus a bounded, chronologically ordered history for one
/// service key.
///
/// `latest` is always the last history element, or the "Never Tested"
/// sentinel when the history is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub key: String,
    latest: ParsedEntry,
    history: VecDeque<ParsedEntry>,
}

impl ServiceStatus {
    /// A service that has never produced a valid entry.
    pub fn never_tested(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            latest: ParsedEntry::sentinel(),
            history: VecDeque::new(),
        }
    }

    /// Build from an already ordered history, keeping the newest `limit`.
    pub fn from_history(
        key: impl Into<String>,
        entries: impl IntoIterator<Item = ParsedEntry>,
        limit: usize,
    ) -> Self {
        Self::never_tested(key).merge(entries, limit)
    }

    pub fn latest(&self) -> &ParsedEntry {
        &self.latest
    }

    pub fn history(&self) -> &VecDeque<ParsedEntry> {
        &self.history
    }

    pub fn is_never_tested(&self) -> bool {
        self.history.is_empty()
    }

    /// Append `new_entries` in arrival order and keep only the newest `limit`.
    ///
    /// Entries are not re-sorted: probe logs are append-only and already
    /// chronological.
    pub fn merge(
        mut self,
        new_entries: impl IntoIterator<Item = ParsedEntry>,
        limit: usize,
    ) -> Self {
        self.history.extend(new_entries);
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
        self.latest = self
            .history
            .back()
            .cloned()
            .unwrap_or_else(ParsedEntry::sentinel);
        self
    }
}

/// Merge `new_entries` into `existing`. See [`ServiceStatus::merge`].
pub fn merge(
    existing: ServiceStatus,
    new_entries: Vec<ParsedEntry>,
    limit: usize,
) -> ServiceStatus {
    existing.merge(new_entries, limit)
}
