//! Processed-file ledger.
//!
//! Tracks which input files have been routed so repeated runs skip them:
//! - Append-only JSON-lines log with fsync per entry
//! - Replay on open, honouring the last reset
//! - Scoped lock file so two runs never share a ledger

mod entries;
mod log;
mod memory;
mod replay;

pub use entries::{LedgerEntry, OutcomeCounts, ProcessedEntry};
pub use log::FileLedger;
pub use memory::MemoryLedger;
pub use replay::LedgerState;

use crate::LedgerError;
use uuid::Uuid;

/// Durable record of routed files.
///
/// A file is marked only after the coordinator has finished it, so an
/// interrupted file is never recorded as processed.
pub trait Ledger: Send + Sync {
    /// Whether `file_id` has been routed since the last reset.
    fn is_processed(&self, file_id: &str) -> Result<bool, LedgerError>;

    /// Record a finished file.
    fn mark_processed(&self, entry: ProcessedEntry) -> Result<(), LedgerError>;

    /// Forget every processed file.
    fn reset(&self, run_id: Uuid) -> Result<(), LedgerError>;

    /// Processed files, oldest first.
    fn entries(&self) -> Result<Vec<ProcessedEntry>, LedgerError>;
}
