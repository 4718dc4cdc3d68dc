//! Core data model shared by providers, the cache and the engines

mod record;
mod status;

pub use record::{fields, normalize_name, Record, RecordSource};
pub use status::{DegradedReason, ProviderHealth, ProviderReport, ProviderStatus, StatusMap};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Records of one query, grouped by the provider that produced them.
///
/// Grouping is deterministic; the relative order of providers carries no
/// meaning and engines must not depend on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    groups: BTreeMap<String, Vec<Record>>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from loose records, grouping by their provider
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.push(record);
        }
        set
    }

    pub fn push(&mut self, record: Record) {
        self.groups
            .entry(record.provider.clone())
            .or_default()
            .push(record);
    }

    /// Replace the records contributed by a provider
    pub fn insert_group(&mut self, provider: &str, records: Vec<Record>) {
        self.groups.insert(provider.to_string(), records);
    }

    pub fn group(&self, provider: &str) -> &[Record] {
        self.groups.get(provider).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.groups.values().flatten()
    }

    pub fn of_source(&self, source: RecordSource) -> impl Iterator<Item = &Record> {
        self.iter().filter(move |r| r.source == source)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absorb another set; groups from `other` extend existing ones
    pub fn extend(&mut self, other: RecordSet) {
        for (provider, records) in other.groups {
            self.groups.entry(provider).or_default().extend(records);
        }
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        Self::from_records(iter)
    }
}
