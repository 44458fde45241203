//! Field mapper: translates source-native fields onto a domain's canonical schema.

use super::tables::{MappingSpec, RoutingTables};
use crate::error::MappingError;
use crate::model::{is_empty, key_string, CanonicalRecord, FieldValues, RawRecord, TargetDomain};
use serde_json::Value;
use std::collections::HashMap;

/// Maps raw records through the (source, domain) alias tables.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapper<'t> {
    tables: &'t RoutingTables,
}

impl<'t> FieldMapper<'t> {
    /// Create a mapper over `tables`.
    pub fn new(tables: &'t RoutingTables) -> Self {
        Self { tables }
    }

    /// Map `raw` onto the canonical schema of `domain`.
    ///
    /// For each canonical field the first alias carrying a usable value wins.
    /// Unknown source fields are dropped; canonical fields without a match
    /// stay unset. Sources without an alias table for `domain` map by name.
    pub fn map_fields(
        &self,
        source: &str,
        domain: TargetDomain,
        raw: &RawRecord,
    ) -> Result<CanonicalRecord, MappingError> {
        let lookup = FieldLookup::new(&raw.fields);
        let mut fields = match self.tables.mapping(source, domain) {
            Some(mapping) => self.aliased(mapping, &lookup),
            None => self.identity(domain, &lookup),
        };

        if fields.is_empty() {
            return Err(MappingError::Incomplete {
                source_name: source.to_string(),
                domain: domain.to_string(),
            });
        }

        if let Some(mapping) = self.tables.mapping(source, domain) {
            for (field, value) in &mapping.constants {
                fields
                    .entry(field.clone())
                    .or_insert_with(|| value.clone());
            }
        }

        let key = self
            .tables
            .domain(domain)
            .and_then(|schema| schema.key_field.as_deref())
            .and_then(|key_field| fields.get(key_field))
            .and_then(key_string);

        Ok(CanonicalRecord {
            domain,
            fields,
            key,
        })
    }

    fn aliased(&self, mapping: &MappingSpec, lookup: &FieldLookup<'_>) -> FieldValues {
        let mut fields = FieldValues::new();
        for entry in &mapping.fields {
            if fields.contains_key(&entry.canonical) {
                continue;
            }
            let value = entry.aliases.iter().find_map(|alias| {
                let value = lookup.get(alias)?;
                match &entry.transform {
                    Some(transform) => transform.apply(value, self.tables.code_tables()),
                    None => Some(value.clone()),
                }
            });
            if let Some(value) = value {
                fields.insert(entry.canonical.clone(), value);
            }
        }
        fields
    }

    fn identity(&self, domain: TargetDomain, lookup: &FieldLookup<'_>) -> FieldValues {
        let Some(schema) = self.tables.domain(domain) else {
            return FieldValues::new();
        };
        schema
            .fields
            .iter()
            .filter_map(|field| lookup.get(field).map(|v| (field.clone(), v.clone())))
            .collect()
    }
}

/// Source field lookup: exact name first, then case-insensitive.
/// Empty values count as absent.
struct FieldLookup<'r> {
    fields: &'r FieldValues,
    folded: HashMap<String, &'r Value>,
}

impl<'r> FieldLookup<'r> {
    fn new(fields: &'r FieldValues) -> Self {
        let mut folded = HashMap::new();
        for (name, value) in fields {
            if !is_empty(value) {
                folded.entry(name.to_lowercase()).or_insert(value);
            }
        }
        Self { fields, folded }
    }

    fn get(&self, name: &str) -> Option<&'r Value> {
        match self.fields.get(name) {
            Some(value) if !is_empty(value) => Some(value),
            _ => self.folded.get(&name.to_lowercase()).copied(),
        }
    }
}
