//! Ledger command implementations.

use anyhow::Result;
use freshin_core::ledger::{FileLedger, Ledger};
use freshin_core::Config;
use tracing::info;
use uuid::Uuid;

/// Print every processed file.
pub fn list(config: &Config) -> Result<()> {
    let ledger = FileLedger::open(&config.ledger)?;
    let entries = ledger.entries()?;

    println!("Ledger: {}", ledger.path().display());
    if entries.is_empty() {
        println!("  No processed files");
        return Ok(());
    }

    println!(
        "  {:<40} {:<24} {:>8} {:>8} {:>8} {:>8} {:>6}",
        "FILE", "PROCESSED AT", "ROUTED", "CREATED", "UPDATED", "SKIPPED", "ERRORS"
    );
    for entry in &entries {
        println!(
            "  {:<40} {:<24} {:>8} {:>8} {:>8} {:>8} {:>6}",
            entry.file_id,
            entry.processed_at.format("%Y-%m-%d %H:%M:%S"),
            entry.outcome.records_routed,
            entry.outcome.rows_created,
            entry.outcome.rows_updated,
            entry.outcome.rows_skipped,
            entry.outcome.errors
        );
    }
    println!("\n{} processed files", entries.len());
    Ok(())
}

/// Forget every processed file.
pub fn reset(config: &Config) -> Result<()> {
    let ledger = FileLedger::open(&config.ledger)?;
    let forgotten = ledger.entries()?.len();
    ledger.reset(Uuid::new_v4())?;

    info!(ledger = %ledger.path().display(), forgotten, "Ledger reset");
    println!("Ledger reset ({} entries forgotten)", forgotten);
    Ok(())
}
