//! Rebuild the processed-file index from ledger entries.

use super::entries::{LedgerEntry, ProcessedEntry};
use std::collections::BTreeMap;
use tracing::info;

/// Processed-file index rebuilt from the log.
#[derive(Debug, Default, Clone)]
pub struct LedgerState {
    /// Latest entry per file identifier
    pub processed: BTreeMap<String, ProcessedEntry>,

    /// Entries read, including those superseded by a reset
    pub entries_replayed: u64,

    /// Number of resets seen
    pub resets: u64,
}

impl LedgerState {
    /// Replay entries in log order. A reset drops everything before it.
    pub fn replay(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let mut state = LedgerState::default();
        for entry in entries {
            state.apply(entry);
        }
        info!(
            files = state.processed.len(),
            entries = state.entries_replayed,
            resets = state.resets,
            "Ledger replayed"
        );
        state
    }

    /// Apply one entry.
    pub fn apply(&mut self, entry: LedgerEntry) {
        self.entries_replayed += 1;
        match entry {
            LedgerEntry::Processed(processed) => {
                self.processed.insert(processed.file_id.clone(), processed);
            }
            LedgerEntry::Reset { .. } => {
                self.processed.clear();
                self.resets += 1;
            }
        }
    }

    /// Processed entries, oldest first.
    pub fn entries(&self) -> Vec<ProcessedEntry> {
        let mut entries: Vec<ProcessedEntry> = self.processed.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.processed_at
                .cmp(&b.processed_at)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        entries
    }
}
