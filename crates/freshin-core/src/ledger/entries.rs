//! Ledger entry types.
//!
//! Each line of the ledger log is one [`LedgerEntry`], tagged by `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome counts stored with a processed file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub records_routed: u64,
    pub rows_created: u64,
    pub rows_updated: u64,
    pub rows_skipped: u64,
    pub errors: u64,
}

/// A file the coordinator finished routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEntry {
    /// Input file identifier
    pub file_id: String,
    /// Run that routed the file
    pub run_id: Uuid,
    /// Source the file was read under
    pub source: String,
    /// CRC32 of the file contents
    pub checksum: u32,
    /// Counts reported for the file
    pub outcome: OutcomeCounts,
    /// When the file was marked
    pub processed_at: DateTime<Utc>,
}

/// A ledger log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEntry {
    /// File routed (fully or with per-record errors)
    Processed(ProcessedEntry),

    /// Ledger cleared; earlier entries no longer count
    Reset {
        /// Run or command that cleared the ledger
        run_id: Uuid,
        /// Timestamp
        timestamp: DateTime<Utc>,
    },
}

impl LedgerEntry {
    /// Get the entry timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LedgerEntry::Processed(entry) => entry.processed_at,
            LedgerEntry::Reset { timestamp, .. } => *timestamp,
        }
    }

    /// Check if this is a reset entry.
    pub fn is_reset(&self) -> bool {
        matches!(self, LedgerEntry::Reset { .. })
    }
}
