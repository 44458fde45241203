use super::entries::{LedgerEntry, ProcessedEntry};
use super::replay::LedgerState;
use super::Ledger;
use crate::LedgerError;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

/// In-memory ledger for tests and preview tooling.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently marked.
    pub fn len(&self) -> usize {
        self.state.read().processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Ledger for MemoryLedger {
    fn is_processed(&self, file_id: &str) -> Result<bool, LedgerError> {
        Ok(self.state.read().processed.contains_key(file_id))
    }

    fn mark_processed(&self, entry: ProcessedEntry) -> Result<(), LedgerError> {
        self.state.write().apply(LedgerEntry::Processed(entry));
        Ok(())
    }

    fn reset(&self, run_id: Uuid) -> Result<(), LedgerError> {
        self.state.write().apply(LedgerEntry::Reset {
            run_id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn entries(&self) -> Result<Vec<ProcessedEntry>, LedgerError> {
        Ok(self.state.read().entries())
    }
}
