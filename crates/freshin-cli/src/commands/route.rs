//! Route command implementation.

use anyhow::{Context, Result};
use clap::Args;
use freshin_core::input::{DirectorySource, FileSelection};
use freshin_core::ledger::{FileLedger, Ledger};
use freshin_core::report::RunReport;
use freshin_core::routing::{CancelFlag, RoutingCoordinator, RoutingTables, RunOptions};
use freshin_core::store::JsonFileStore;
use freshin_core::Config;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Options of `freshin route`.
#[derive(Debug, Args)]
pub struct RouteArgs {
    /// Route exports for this date (YYYYMMDD or YYYY-MM-DD); defaults to today
    #[arg(long, conflicts_with = "all")]
    pub date: Option<String>,

    /// Route every export in the input directory
    #[arg(long)]
    pub all: bool,

    /// Route files even if the ledger has them
    #[arg(long)]
    pub force: bool,

    /// Compute decisions without writing the store or the ledger
    #[arg(long)]
    pub preview: bool,

    /// Clear the ledger before routing
    #[arg(long, conflicts_with = "preview")]
    pub reset_ledger: bool,

    /// Override the input directory
    #[arg(long)]
    pub input_dir: Option<PathBuf>,
}

/// Run the router. Returns whether the run was interrupted.
pub async fn run(mut config: Config, args: RouteArgs) -> Result<bool> {
    if let Some(dir) = args.input_dir.clone() {
        config.input.dir = dir;
    }

    let selection = if args.all {
        FileSelection::All
    } else {
        match &args.date {
            Some(date) => FileSelection::date(date)?,
            None => FileSelection::today(),
        }
    };

    let tables = RoutingTables::load(config.routing.tables_path.as_deref())?;
    let files = DirectorySource::new(&config.input.dir, selection).list(&tables)?;

    info!(
        input_dir = %config.input.dir.display(),
        files = files.len(),
        preview = args.preview,
        force = args.force,
        "Starting routing run"
    );

    let cancel = CancelFlag::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let options = RunOptions {
        force_reprocess: args.force,
        preview: args.preview,
        cancel,
    };
    let reset_ledger = args.reset_ledger;
    let store_dir = config.store.dir.clone();
    let ledger_config = config.ledger.clone();

    // The core is synchronous; keep it off the async workers
    let report = tokio::task::spawn_blocking(move || -> Result<RunReport> {
        let store = JsonFileStore::open(&store_dir)?;
        let ledger = FileLedger::open(&ledger_config)?;
        info!(
            store = %store.dir().display(),
            ledger = %ledger.path().display(),
            "Store and ledger opened"
        );
        let coordinator = RoutingCoordinator::new(&tables, &store, &ledger, options);
        if reset_ledger {
            ledger.reset(coordinator.run_id())?;
            info!(ledger = %ledger.path().display(), "Ledger reset");
        }
        Ok(coordinator.route_run(&files)?)
    })
    .await
    .context("routing task panicked")??;

    print_summary(&report);

    if let Some(dir) = &config.report.dir {
        let path = write_report(&report, dir)?;
        println!("\nReport written to {}", path.display());
    }

    Ok(report.interrupted)
}

/// Cancel the run on SIGINT or SIGTERM. The run stops before the next file.
async fn cancel_on_signal(cancel: CancelFlag) {
    #[cfg(unix)]
    {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                cancel.cancel();
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), stopping after the current file");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, stopping after the current file");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, stopping after the current file");
    }

    cancel.cancel();
}

fn print_summary(report: &RunReport) {
    let tally = &report.tally;

    if report.preview {
        println!("Preview run {} (nothing written):", report.run_id);
    } else {
        println!("Routing run {}:", report.run_id);
    }
    println!(
        "  Files: {} discovered, {} routed, {} already processed, {} unreadable",
        tally.files_discovered,
        tally.files_routed,
        tally.files_already_processed,
        tally.files_unreadable
    );
    println!("  Records routed: {}", tally.records_routed);
    println!(
        "  Rows: {} created, {} updated, {} skipped",
        tally.rows_created, tally.rows_updated, tally.rows_skipped
    );
    println!(
        "  Decisions: {} fill, {} overwrite, {} skip",
        tally.decisions.fill, tally.decisions.overwrite, tally.decisions.skip
    );
    println!(
        "  Errors: {} (classification {}, mapping {}, store {}, input {})",
        tally.errors,
        tally.failures.classification,
        tally.failures.mapping,
        tally.failures.store,
        tally.failures.input
    );
    if tally.batches_ignored > 0 {
        println!("  Reference batches ignored: {}", tally.batches_ignored);
    }

    if !tally.records_by_domain.is_empty() {
        println!("\nRecords by domain:");
        for (domain, count) in &tally.records_by_domain {
            println!("  {:<24} {}", domain.as_str(), count);
        }
    }

    if !report.outcomes.is_empty() {
        println!("\nFiles:");
        for outcome in &report.outcomes {
            println!("  {}", outcome);
        }
    }

    if report.interrupted {
        println!("\nRun interrupted; remaining files will be picked up next run");
    }
}

fn write_report(report: &RunReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating report directory {}", dir.display()))?;
    let path = dir.join(report.file_name());
    let body = serde_json::to_vec_pretty(report)?;
    std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
