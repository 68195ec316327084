//! Collapse repeated per-entity lines into one record per entity.
//!
//! Collection checks emit one line per collection per run; notebook checks one
//! line per notebook. Only the most recent result per entity is kept.

use std::collections::{BTreeMap, HashMap};

use crate::parser::{fields, ParsedEntry};

/// Last-write-wins reduction keyed by one `extra` field.
#[derive(Debug, Clone)]
pub struct CollectionDeduplicator {
    key_field: &'static str,
    records: HashMap<String, ParsedEntry>,
    unkeyed: usize,
}

impl Default for CollectionDeduplicator {
    fn default() -> Self {
        Self::by_field(fields::COLLECTION)
    }
}

impl CollectionDeduplicator {
    pub fn by_field(key_field: &'static str) -> Self {
        Self {
            key_field,
            records: HashMap::new(),
            unkeyed: 0,
        }
    }

    /// Offer one entry. An entry replaces the stored one only when its
    /// timestamp is the same or later, so out-of-order arrivals never roll a
    /// record back.
    pub fn insert(&mut self, entry: ParsedEntry) {
        let Some(id) = entry.extra(self.key_field).map(str::to_string) else {
            self.unkeyed += 1;
            return;
        };
        match self.records.get(&id) {
            Some(stored) if entry.timestamp < stored.timestamp => {}
            _ => {
                self.records.insert(id, entry);
            }
        }
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = ParsedEntry>) {
        for entry in entries {
            self.insert(entry);
        }
    }

    /// Entries that lacked the key field.
    pub fn unkeyed(&self) -> usize {
        self.unkeyed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Unordered map of entity id to its latest entry.
    pub fn into_map(self) -> HashMap<String, ParsedEntry> {
        self.records
    }

    /// Same as [`into_map`](Self::into_map) but ordered by entity id.
    pub fn into_sorted(self) -> BTreeMap<String, ParsedEntry> {
        self.records.into_iter().collect()
    }
}

/// Reduce collection-keyed entries to one entry per collection id.
pub fn reduce(entries: impl IntoIterator<Item = ParsedEntry>) -> HashMap<String, ParsedEntry> {
    let mut dedup = CollectionDeduplicator::default();
    dedup.extend(entries);
    dedup.into_map()
}
