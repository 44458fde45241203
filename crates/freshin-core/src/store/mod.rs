//! Target stores that hold the merged rows of each domain.
//!
//! - [`MemoryStore`]: in-process maps, used by tests and fixtures
//! - [`JsonFileStore`]: one JSON document per domain, written on flush
//! - [`PreviewStore`]: write overlay over a read-only base, backs preview runs

mod json_file;
mod memory;
mod preview;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use preview::PreviewStore;

use crate::error::TargetStoreError;
use crate::model::{FieldValues, TargetDomain, TargetRow};

/// Rows of one domain, keyed by row key.
pub type DomainRows = std::collections::BTreeMap<String, TargetRow>;

/// Row storage the routing coordinator writes into.
pub trait TargetStore: Send + Sync {
    /// Fetch a row, `None` when absent.
    fn get_row(&self, domain: TargetDomain, key: &str) -> Result<Option<TargetRow>, TargetStoreError>;

    /// Create the row or set the given fields on it. Fields not listed are left untouched.
    fn upsert_row(
        &self,
        domain: TargetDomain,
        key: &str,
        values: &FieldValues,
    ) -> Result<(), TargetStoreError>;

    /// Persist buffered writes.
    fn flush(&self) -> Result<(), TargetStoreError>;
}

/// Merge `values` into the row at `key`, creating it when absent.
pub(crate) fn apply_upsert(rows: &mut DomainRows, key: &str, values: &FieldValues) {
    let row = rows.entry(key.to_string()).or_default();
    for (field, value) in values {
        row.fields.insert(field.clone(), value.clone());
    }
}
