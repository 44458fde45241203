use super::{apply_upsert, DomainRows, TargetStore};
use crate::error::TargetStoreError;
use crate::model::{FieldValues, TargetDomain, TargetRow};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory target store.
///
/// Counts calls so tests can assert that a run never touched the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<TargetDomain, DomainRows>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly, bypassing the call counters.
    pub fn insert(&self, domain: TargetDomain, key: &str, row: TargetRow) {
        self.rows
            .write()
            .entry(domain)
            .or_default()
            .insert(key.to_string(), row);
    }

    /// Snapshot of a row.
    pub fn row(&self, domain: TargetDomain, key: &str) -> Option<TargetRow> {
        self.rows
            .read()
            .get(&domain)
            .and_then(|rows| rows.get(key))
            .cloned()
    }

    /// Number of rows in a domain.
    pub fn len(&self, domain: TargetDomain) -> usize {
        self.rows.read().get(&domain).map_or(0, |rows| rows.len())
    }

    /// Whether no domain holds any row.
    pub fn is_empty(&self) -> bool {
        self.rows.read().values().all(|rows| rows.is_empty())
    }

    /// Total `get_row` and `upsert_row` calls made.
    pub fn calls(&self) -> u64 {
        self.reads.load(Ordering::Relaxed) + self.writes.load(Ordering::Relaxed)
    }

    /// Snapshot of every row, keyed by domain.
    pub fn snapshot(&self) -> BTreeMap<TargetDomain, DomainRows> {
        self.rows.read().clone()
    }

    pub(crate) fn from_rows(rows: BTreeMap<TargetDomain, DomainRows>) -> Self {
        Self {
            rows: RwLock::new(rows),
            ..Self::default()
        }
    }
}

impl TargetStore for MemoryStore {
    fn get_row(&self, domain: TargetDomain, key: &str) -> Result<Option<TargetRow>, TargetStoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.row(domain, key))
    }

    fn upsert_row(
        &self,
        domain: TargetDomain,
        key: &str,
        values: &FieldValues,
    ) -> Result<(), TargetStoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        apply_upsert(self.rows.write().entry(domain).or_default(), key, values);
        Ok(())
    }

    fn flush(&self) -> Result<(), TargetStoreError> {
        Ok(())
    }
}
