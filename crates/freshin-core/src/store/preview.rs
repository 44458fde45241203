use super::{apply_upsert, DomainRows, TargetStore};
use crate::error::TargetStoreError;
use crate::model::{FieldValues, TargetDomain, TargetRow};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Overlay store for preview runs.
///
/// Reads see the base store with the overlay's writes applied on top; writes
/// only ever land in the overlay, so the base is never modified.
pub struct PreviewStore<'a> {
    base: &'a dyn TargetStore,
    overlay: RwLock<BTreeMap<TargetDomain, DomainRows>>,
}

impl<'a> PreviewStore<'a> {
    pub fn new(base: &'a dyn TargetStore) -> Self {
        Self {
            base,
            overlay: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of rows the preview would have written.
    pub fn pending_rows(&self) -> usize {
        self.overlay.read().values().map(|rows| rows.len()).sum()
    }
}

impl TargetStore for PreviewStore<'_> {
    fn get_row(&self, domain: TargetDomain, key: &str) -> Result<Option<TargetRow>, TargetStoreError> {
        let staged = self
            .overlay
            .read()
            .get(&domain)
            .and_then(|rows| rows.get(key))
            .cloned();
        let base = self.base.get_row(domain, key)?;
        Ok(match (base, staged) {
            (Some(mut row), Some(staged)) => {
                row.fields.extend(staged.fields);
                Some(row)
            }
            (base, staged) => staged.or(base),
        })
    }

    fn upsert_row(
        &self,
        domain: TargetDomain,
        key: &str,
        values: &FieldValues,
    ) -> Result<(), TargetStoreError> {
        apply_upsert(self.overlay.write().entry(domain).or_default(), key, values);
        Ok(())
    }

    fn flush(&self) -> Result<(), TargetStoreError> {
        Ok(())
    }
}
