//! Type classifier: picks the target domain of a raw record.
//!
//! Resolution order, first match wins:
//! 1. the source's fixed domain
//! 2. the source's type-hint lookup
//! 3. the domain whose indicator set shares the most field names with the
//!    record, ties broken by the configured precedence

use super::tables::RoutingTables;
use crate::error::ClassificationError;
use crate::model::TargetDomain;
use std::collections::BTreeSet;
use tracing::trace;

/// Classifies records against the routing tables.
#[derive(Debug, Clone, Copy)]
pub struct TypeClassifier<'t> {
    tables: &'t RoutingTables,
}

impl<'t> TypeClassifier<'t> {
    /// Create a classifier over `tables`.
    pub fn new(tables: &'t RoutingTables) -> Self {
        Self { tables }
    }

    /// Determine the target domain for a record.
    pub fn classify<I, S>(
        &self,
        source: &str,
        type_hint: Option<&str>,
        field_names: I,
    ) -> Result<TargetDomain, ClassificationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some(domain) = self.tables.fixed_domain(source) {
            return Ok(domain);
        }

        if let Some(domain) = type_hint.and_then(|hint| self.tables.hint_domain(source, hint)) {
            return Ok(domain);
        }

        // Set semantics make the result independent of field order
        let names: BTreeSet<String> = field_names
            .into_iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .collect();

        let mut best: Option<(TargetDomain, usize)> = None;
        for &domain in self.tables.precedence() {
            let Some(schema) = self.tables.domain(domain) else {
                continue;
            };
            let hits = schema.indicators.intersection(&names).count();
            trace!(source, domain = %domain, hits, "Indicator intersection");
            // Strictly greater keeps the earlier domain on ties
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((domain, hits));
            }
        }

        best.map(|(domain, _)| domain)
            .ok_or_else(|| ClassificationError::Unclassified {
                source_name: source.to_string(),
                hint: type_hint.map(str::to_string),
                field_count: names.len(),
            })
    }
}
