//! Routing coordinator: drives files through classification, mapping and
//! merging, applies the resulting writes and marks finished files.
//!
//! Error handling per file:
//! - classification and mapping failures skip the record
//! - store failures are counted and the file carries on
//! - unreadable files are reported and left unmarked
//! - ledger failures abort the run

use super::classifier::TypeClassifier;
use super::mapper::FieldMapper;
use super::merge::MergePolicy;
use super::tables::RoutingTables;
use crate::input::{ExportContents, InputFile, RawBatch};
use crate::ledger::{Ledger, ProcessedEntry};
use crate::model::{FieldValues, RawRecord, TargetRow};
use crate::report::{FileStatus, RoutingOutcome, RunReport, RunTally};
use crate::store::{PreviewStore, TargetStore};
use crate::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared cancellation flag, checked before each file is read and before
/// a file's first batch is routed.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the run stops before the next file.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run parameters.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Route files even when the ledger has them
    pub force_reprocess: bool,
    /// Compute decisions without writing the store or the ledger
    pub preview: bool,
    pub cancel: CancelFlag,
}

/// A read file whose batches are still being routed.
struct PendingFile {
    file_id: String,
    source: String,
    contents: ExportContents,
    outcome: RoutingOutcome,
    remaining: usize,
    started: bool,
}

enum Loaded {
    /// Already processed or unreadable
    Finished(RoutingOutcome),
    Pending(PendingFile),
}

/// One batch, scheduled by the priority of the source it routes under.
struct BatchUnit {
    priority: u32,
    file: usize,
    batch: usize,
    source: String,
}

/// Routes input files into a target store.
pub struct RoutingCoordinator<'a> {
    tables: &'a RoutingTables,
    store: &'a dyn TargetStore,
    ledger: &'a dyn Ledger,
    options: RunOptions,
    run_id: Uuid,
}

impl<'a> RoutingCoordinator<'a> {
    /// Create a coordinator with a fresh run id.
    pub fn new(
        tables: &'a RoutingTables,
        store: &'a dyn TargetStore,
        ledger: &'a dyn Ledger,
        options: RunOptions,
    ) -> Self {
        Self {
            tables,
            store,
            ledger,
            options,
            run_id: Uuid::new_v4(),
        }
    }

    /// Identifier written to ledger entries and reports.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Route a single file.
    ///
    /// In preview mode writes go to a throwaway overlay and the file is not
    /// marked.
    pub fn route(&self, file: &dyn InputFile) -> Result<RoutingOutcome> {
        let overlay = self.options.preview.then(|| PreviewStore::new(self.store));
        let store: &dyn TargetStore = match &overlay {
            Some(overlay) => overlay,
            None => self.store,
        };

        let mut file = match self.load(file)? {
            Loaded::Finished(outcome) => return Ok(outcome),
            Loaded::Pending(pending) => pending,
        };
        for unit in self.schedule(std::slice::from_ref(&file)) {
            self.route_batch(&file.contents.batches[unit.batch], &unit.source, store, &mut file.outcome);
        }
        self.finish(file, store)
    }

    /// Route `files` as one run.
    ///
    /// Every batch of every unprocessed file is scheduled by the priority of
    /// the source it routes under, ascending, so higher-priority sources are
    /// applied last even when they share a file with other sources. Equal
    /// priorities keep file order (source priority, then file id) and batch
    /// order. A file is flushed and marked once its last batch is applied.
    pub fn route_run<F: InputFile>(&self, files: &[F]) -> Result<RunReport> {
        let started_at = Utc::now();
        let mut ordered: Vec<&F> = files.iter().collect();
        ordered.sort_by(|a, b| {
            let pa = self.tables.descriptor(a.source()).priority;
            let pb = self.tables.descriptor(b.source()).priority;
            pa.cmp(&pb).then_with(|| a.file_id().cmp(b.file_id()))
        });

        info!(
            run_id = %self.run_id,
            files = ordered.len(),
            preview = self.options.preview,
            force = self.options.force_reprocess,
            "Routing run started"
        );

        // One overlay for the whole run so later files see earlier preview writes
        let overlay = self.options.preview.then(|| PreviewStore::new(self.store));
        let store: &dyn TargetStore = match &overlay {
            Some(overlay) => overlay,
            None => self.store,
        };

        let mut outcomes = Vec::with_capacity(ordered.len());
        let mut pending = Vec::new();
        let mut interrupted = false;

        for file in &ordered {
            if self.options.cancel.is_cancelled() {
                warn!(run_id = %self.run_id, next_file = file.file_id(), "Run interrupted");
                interrupted = true;
                break;
            }
            match self.load(*file)? {
                Loaded::Finished(outcome) => outcomes.push(outcome),
                Loaded::Pending(file) => pending.push(file),
            }
        }

        interrupted |= self.route_pending(pending, store, &mut outcomes)?;

        let mut tally = RunTally {
            files_discovered: ordered.len() as u64,
            ..RunTally::default()
        };
        for outcome in &outcomes {
            tally.record(outcome);
        }

        if let Some(overlay) = &overlay {
            info!(pending_rows = overlay.pending_rows(), "Preview complete, store untouched");
        }

        info!(
            run_id = %self.run_id,
            files_routed = tally.files_routed,
            already_processed = tally.files_already_processed,
            unreadable = tally.files_unreadable,
            records_routed = tally.records_routed,
            rows_created = tally.rows_created,
            rows_updated = tally.rows_updated,
            rows_skipped = tally.rows_skipped,
            errors = tally.errors,
            interrupted,
            "Routing run finished"
        );

        Ok(RunReport {
            run_id: self.run_id,
            started_at,
            finished_at: Utc::now(),
            preview: self.options.preview,
            interrupted,
            outcomes,
            tally,
        })
    }

    /// Ledger check and read of one file.
    fn load(&self, file: &dyn InputFile) -> Result<Loaded> {
        let file_id = file.file_id();
        let source = file.source();

        if !self.options.force_reprocess {
            let processed = self.ledger.is_processed(file_id).map_err(|e| {
                error!(file_id, error = %e, "Ledger read failed, aborting run");
                e
            })?;
            if processed {
                debug!(file_id, "Already processed, skipping");
                return Ok(Loaded::Finished(RoutingOutcome::new(
                    file_id,
                    source,
                    FileStatus::AlreadyProcessed,
                )));
            }
        }

        match file.read() {
            Ok(contents) => Ok(Loaded::Pending(PendingFile {
                file_id: file_id.to_string(),
                source: source.to_string(),
                remaining: contents.batches.len(),
                contents,
                outcome: RoutingOutcome::new(file_id, source, FileStatus::Routed),
                started: false,
            })),
            Err(e) => {
                warn!(file_id, source, error = %e, "Input file unreadable, leaving unmarked");
                let mut outcome = RoutingOutcome::new(file_id, source, FileStatus::Unreadable);
                outcome.errors = 1;
                outcome.failures.input = 1;
                Ok(Loaded::Finished(outcome))
            }
        }
    }

    /// Apply the batches of `files` in priority order, finishing each file
    /// after its last batch. Returns whether the run was cancelled.
    ///
    /// Once cancelled, files that have not started are dropped unmarked;
    /// started files still complete.
    fn route_pending(
        &self,
        files: Vec<PendingFile>,
        store: &dyn TargetStore,
        outcomes: &mut Vec<RoutingOutcome>,
    ) -> Result<bool> {
        let units = self.schedule(&files);

        let mut files: Vec<Option<PendingFile>> = files.into_iter().map(Some).collect();

        // Exports without batches have nothing to schedule
        for slot in files.iter_mut() {
            if slot.as_ref().map_or(false, |file| file.remaining == 0) {
                if let Some(file) = slot.take() {
                    outcomes.push(self.finish(file, store)?);
                }
            }
        }

        let mut interrupted = false;
        for unit in &units {
            let Some(file) = files[unit.file].as_mut() else {
                continue;
            };
            if !file.started && self.options.cancel.is_cancelled() {
                if !interrupted {
                    warn!(run_id = %self.run_id, next_file = %file.file_id, "Run interrupted");
                }
                interrupted = true;
                continue;
            }
            file.started = true;

            let batch = &file.contents.batches[unit.batch];
            self.route_batch(batch, &unit.source, store, &mut file.outcome);
            file.remaining -= 1;

            if file.remaining == 0 {
                if let Some(file) = files[unit.file].take() {
                    outcomes.push(self.finish(file, store)?);
                }
            }
        }

        Ok(interrupted)
    }

    /// Every batch of `files`, ascending by the priority of the source it
    /// routes under.
    fn schedule(&self, files: &[PendingFile]) -> Vec<BatchUnit> {
        let mut units = Vec::new();
        for (index, file) in files.iter().enumerate() {
            for (batch_index, batch) in file.contents.batches.iter().enumerate() {
                let source = self.batch_source(batch, &file.source);
                units.push(BatchUnit {
                    priority: self.tables.descriptor(&source).priority,
                    file: index,
                    batch: batch_index,
                    source,
                });
            }
        }
        // Stable, so equal priorities keep file and batch order
        units.sort_by_key(|unit| unit.priority);
        units
    }

    /// Route every record of one batch under `source`.
    fn route_batch(&self, batch: &RawBatch, source: &str, store: &dyn TargetStore, outcome: &mut RoutingOutcome) {
        if let Some(hint) = batch.type_hint.as_deref() {
            if self.tables.is_ignored_hint(source, hint) {
                debug!(file_id = %outcome.file_id, source, hint, "Reference batch ignored");
                outcome.batches_ignored += 1;
                return;
            }
        }
        for mut record in batch.raw_records() {
            record.source = source.to_string();
            self.route_record(&record, store, outcome);
        }
    }

    /// Flush the store and mark a file whose batches are all applied.
    fn finish(&self, file: PendingFile, store: &dyn TargetStore) -> Result<RoutingOutcome> {
        let PendingFile {
            file_id,
            source,
            contents,
            mut outcome,
            ..
        } = file;

        if let Err(e) = store.flush() {
            warn!(file_id = %file_id, error = %e, "Store flush failed");
            outcome.errors += 1;
            outcome.failures.store += 1;
        }

        if !self.options.preview {
            let entry = ProcessedEntry {
                file_id: file_id.clone(),
                run_id: self.run_id,
                source,
                checksum: contents.checksum,
                outcome: outcome.counts(),
                processed_at: Utc::now(),
            };
            self.ledger.mark_processed(entry).map_err(|e| {
                error!(file_id = %file_id, error = %e, "Ledger write failed, aborting run");
                e
            })?;
        }

        info!("{}", outcome);
        Ok(outcome)
    }

    /// Classify, map and merge one record, applying the writes.
    fn route_record(&self, raw: &RawRecord, store: &dyn TargetStore, outcome: &mut RoutingOutcome) {
        let source = raw.source.as_str();

        let classifier = TypeClassifier::new(self.tables);
        let domain = match classifier.classify(source, raw.type_hint.as_deref(), raw.fields.keys()) {
            Ok(domain) => domain,
            Err(e) => {
                debug!(file_id = %outcome.file_id, error = %e, "Record unclassified");
                outcome.errors += 1;
                outcome.rows_skipped += 1;
                outcome.failures.classification += 1;
                return;
            }
        };

        let record = match FieldMapper::new(self.tables).map_fields(source, domain, raw) {
            Ok(record) => record,
            Err(e) => {
                debug!(file_id = %outcome.file_id, error = %e, "Record not mappable");
                outcome.errors += 1;
                outcome.rows_skipped += 1;
                outcome.failures.mapping += 1;
                return;
            }
        };

        let key = record.row_key();
        let existing = match store.get_row(domain, &key) {
            Ok(existing) => existing,
            Err(e) => {
                warn!(file_id = %outcome.file_id, domain = %domain, key = %key, error = %e, "Row read failed");
                outcome.errors += 1;
                outcome.failures.store += 1;
                return;
            }
        };

        let decisions = MergePolicy::new(self.tables).compute_decisions(source, &record, existing.as_ref());
        outcome.decisions.record(&decisions);
        outcome.records_routed += 1;
        outcome.count_domain(domain);

        let changes = changed_values(&record.fields, &decisions, existing.as_ref());
        if changes.is_empty() {
            outcome.rows_skipped += 1;
            return;
        }

        match store.upsert_row(domain, &key, &changes) {
            Ok(()) if existing.is_none() => outcome.rows_created += 1,
            Ok(()) => outcome.rows_updated += 1,
            Err(e) => {
                warn!(
                    file_id = %outcome.file_id,
                    domain = %domain,
                    key = %key,
                    fields = changes.len(),
                    error = %e,
                    "Row write failed"
                );
                outcome.errors += changes.len() as u64;
                outcome.failures.store += changes.len() as u64;
            }
        }
    }

    /// Source a batch routes under.
    ///
    /// Envelopes sometimes carry a sub-source label such as `imdb_scrape`;
    /// when that label is unregistered but extends the file's registered
    /// source, the file's source is used.
    fn batch_source(&self, batch: &RawBatch, file_source: &str) -> String {
        let label = batch.source.to_lowercase();
        let file_source = file_source.to_lowercase();
        if self.tables.source(&label).is_none()
            && self.tables.source(&file_source).is_some()
            && label.starts_with(&file_source)
        {
            return file_source;
        }
        label
    }
}

/// Values that the decisions write and that differ from the stored row.
fn changed_values(
    fields: &FieldValues,
    decisions: &super::merge::Decisions,
    existing: Option<&TargetRow>,
) -> FieldValues {
    fields
        .iter()
        .filter(|(field, _)| decisions.get(*field).map_or(false, |d| d.writes()))
        .filter(|(field, value)| existing.map_or(true, |row| row.fields.get(*field) != Some(*value)))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}
