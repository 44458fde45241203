//! Merge policy engine: per-field write decisions for a canonical record.
//!
//! The engine is pure. It never touches a store; callers apply the returned
//! decisions themselves.

use super::tables::RoutingTables;
use crate::model::{CanonicalRecord, MergeDecision, MergeMode, TargetRow};
use std::collections::BTreeMap;

/// Per-field decisions, keyed by canonical field name.
pub type Decisions = BTreeMap<String, MergeDecision>;

/// Computes write decisions from the configured per-(source, field) modes.
#[derive(Debug, Clone, Copy)]
pub struct MergePolicy<'t> {
    tables: &'t RoutingTables,
}

impl<'t> MergePolicy<'t> {
    /// Create a policy engine over `tables`.
    pub fn new(tables: &'t RoutingTables) -> Self {
        Self { tables }
    }

    /// Decide, field by field, how `record` is written over `existing`.
    ///
    /// Without an existing row every field is `Fill`. Otherwise OVERWRITE-mode
    /// fields are `Overwrite`, and MERGE-mode fields are `Fill` when the
    /// existing value is empty and `Skip` when it is not.
    pub fn compute_decisions(
        &self,
        source: &str,
        record: &CanonicalRecord,
        existing: Option<&TargetRow>,
    ) -> Decisions {
        record
            .fields
            .keys()
            .map(|field| {
                let decision = match existing {
                    None => MergeDecision::Fill,
                    Some(row) => match self.tables.mode(source, field) {
                        MergeMode::Overwrite => MergeDecision::Overwrite,
                        MergeMode::Merge if row.value(field).is_none() => MergeDecision::Fill,
                        MergeMode::Merge => MergeDecision::Skip,
                    },
                };
                (field.clone(), decision)
            })
            .collect()
    }
}

/// Decision totals, as reported per file and per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DecisionCounts {
    pub fill: u64,
    pub overwrite: u64,
    pub skip: u64,
}

impl DecisionCounts {
    /// Count one set of decisions.
    pub fn record(&mut self, decisions: &Decisions) {
        for decision in decisions.values() {
            match decision {
                MergeDecision::Fill => self.fill += 1,
                MergeDecision::Overwrite => self.overwrite += 1,
                MergeDecision::Skip => self.skip += 1,
            }
        }
    }

    /// Add another set of totals.
    pub fn add(&mut self, other: &DecisionCounts) {
        self.fill += other.fill;
        self.overwrite += other.overwrite;
        self.skip += other.skip;
    }
}
