//! Per-file routing outcomes and the run-level tally.

use crate::ledger::OutcomeCounts;
use crate::model::TargetDomain;
use crate::routing::DecisionCounts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// What happened to an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Records were routed (possibly with per-record errors)
    Routed,
    /// Found in the ledger and not re-read
    AlreadyProcessed,
    /// Could not be read or parsed; not marked processed
    Unreadable,
}

/// Non-fatal errors by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCounts {
    pub classification: u64,
    pub mapping: u64,
    pub store: u64,
    pub input: u64,
}

impl FailureCounts {
    pub fn total(&self) -> u64 {
        self.classification + self.mapping + self.store + self.input
    }

    pub fn add(&mut self, other: &FailureCounts) {
        self.classification += other.classification;
        self.mapping += other.mapping;
        self.store += other.store;
        self.input += other.input;
    }
}

/// Result of routing one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingOutcome {
    pub file_id: String,
    pub source: String,
    pub status: FileStatus,
    /// Domain most records of the file went to
    pub target_domain: Option<TargetDomain>,
    /// Records per domain
    pub domain_counts: BTreeMap<TargetDomain, u64>,
    /// Records that were classified, mapped and merged
    pub records_routed: u64,
    pub rows_created: u64,
    pub rows_updated: u64,
    pub rows_skipped: u64,
    /// Non-fatal errors; per failed store write, one per field
    pub errors: u64,
    pub failures: FailureCounts,
    pub decisions: DecisionCounts,
    /// Batches dropped as reference data
    pub batches_ignored: u64,
}

impl RoutingOutcome {
    /// Empty outcome for a file.
    pub fn new(file_id: impl Into<String>, source: impl Into<String>, status: FileStatus) -> Self {
        Self {
            file_id: file_id.into(),
            source: source.into(),
            status,
            target_domain: None,
            domain_counts: BTreeMap::new(),
            records_routed: 0,
            rows_created: 0,
            rows_updated: 0,
            rows_skipped: 0,
            errors: 0,
            failures: FailureCounts::default(),
            decisions: DecisionCounts::default(),
            batches_ignored: 0,
        }
    }

    /// Counts persisted with the ledger entry.
    pub fn counts(&self) -> OutcomeCounts {
        OutcomeCounts {
            records_routed: self.records_routed,
            rows_created: self.rows_created,
            rows_updated: self.rows_updated,
            rows_skipped: self.rows_skipped,
            errors: self.errors,
        }
    }

    /// Count a routed record for `domain` and refresh the dominant domain.
    pub(crate) fn count_domain(&mut self, domain: TargetDomain) {
        *self.domain_counts.entry(domain).or_default() += 1;
        // Most records wins; ties keep the earlier domain in declaration order
        self.target_domain = self
            .domain_counts
            .iter()
            .fold(None, |best: Option<(TargetDomain, u64)>, (d, n)| match best {
                Some((_, top)) if top >= *n => best,
                _ => Some((*d, *n)),
            })
            .map(|(d, _)| d);
    }
}

impl fmt::Display for RoutingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let domain = self
            .target_domain
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into());
        write!(
            f,
            "{} [{}] {:?} -> {}: routed={} created={} updated={} skipped={} errors={}",
            self.file_id,
            self.source,
            self.status,
            domain,
            self.records_routed,
            self.rows_created,
            self.rows_updated,
            self.rows_skipped,
            self.errors
        )
    }
}

/// Aggregate over every file of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTally {
    pub files_discovered: u64,
    pub files_routed: u64,
    pub files_already_processed: u64,
    pub files_unreadable: u64,
    pub records_routed: u64,
    pub rows_created: u64,
    pub rows_updated: u64,
    pub rows_skipped: u64,
    pub batches_ignored: u64,
    pub errors: u64,
    pub failures: FailureCounts,
    pub decisions: DecisionCounts,
    pub records_by_domain: BTreeMap<TargetDomain, u64>,
}

impl RunTally {
    /// Add one file's outcome.
    pub fn record(&mut self, outcome: &RoutingOutcome) {
        match outcome.status {
            FileStatus::Routed => self.files_routed += 1,
            FileStatus::AlreadyProcessed => self.files_already_processed += 1,
            FileStatus::Unreadable => self.files_unreadable += 1,
        }
        self.records_routed += outcome.records_routed;
        self.rows_created += outcome.rows_created;
        self.rows_updated += outcome.rows_updated;
        self.rows_skipped += outcome.rows_skipped;
        self.batches_ignored += outcome.batches_ignored;
        self.errors += outcome.errors;
        self.failures.add(&outcome.failures);
        self.decisions.add(&outcome.decisions);
        for (domain, count) in &outcome.domain_counts {
            *self.records_by_domain.entry(*domain).or_default() += count;
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Decisions computed but not applied
    pub preview: bool,
    /// Cancelled between files
    pub interrupted: bool,
    pub outcomes: Vec<RoutingOutcome>,
    pub tally: RunTally,
}

impl RunReport {
    /// Report file name, e.g. `route_report_20240115_120000_<run>.json`.
    pub fn file_name(&self) -> String {
        format!(
            "route_report_{}_{}.json",
            self.started_at.format("%Y%m%d_%H%M%S"),
            self.run_id.simple()
        )
    }
}
