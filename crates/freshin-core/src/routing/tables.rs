//! Routing tables: the immutable per-source and per-domain configuration.
//!
//! Tables are read from TOML into plain serde structs, then validated into a
//! [`RoutingTables`] that every routing component borrows for the whole run.
//! A built-in table set ships with the crate (`tables/builtin.toml`).

use super::transform::{CodeTable, Transform};
use crate::model::{FieldValues, MergeMode, SourceDescriptor, TargetDomain};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

const BUILTIN_TABLES: &str = include_str!("../../tables/builtin.toml");

/// Priority given to sources missing from the tables.
pub const UNREGISTERED_PRIORITY: u32 = 0;

/// Routing tables file layout.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TablesFile {
    /// Domain precedence for indicator ties, highest first
    #[serde(default)]
    pub precedence: Vec<String>,

    /// Domain schemas keyed by domain name
    #[serde(default)]
    pub domains: BTreeMap<String, DomainSpec>,

    /// Source settings keyed by source name
    #[serde(default)]
    pub sources: BTreeMap<String, SourceSpec>,

    /// Code to label tables referenced by transforms
    #[serde(default)]
    pub code_tables: BTreeMap<String, CodeTable>,
}

/// Canonical schema of one domain.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DomainSpec {
    /// Field used to locate an existing row; keyless when absent
    #[serde(default)]
    pub key_field: Option<String>,

    /// Canonical field names
    #[serde(default)]
    pub fields: Vec<String>,

    /// Field names whose presence suggests this domain
    #[serde(default)]
    pub indicators: Vec<String>,
}

/// Settings for one upstream source.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceSpec {
    /// Priority rank; higher ranks are applied later
    #[serde(default)]
    pub priority: u32,

    /// Fixed domain for single-domain sources
    #[serde(default)]
    pub domain: Option<String>,

    /// Type hint label to domain name
    #[serde(default)]
    pub hints: BTreeMap<String, String>,

    /// Type hint labels whose batches are reference data and never routed
    #[serde(default)]
    pub ignored_hints: Vec<String>,

    /// Mode for fields without an override
    #[serde(default)]
    pub default_mode: MergeMode,

    /// Per canonical field mode overrides
    #[serde(default)]
    pub modes: BTreeMap<String, MergeMode>,

    /// Alias tables keyed by domain name
    #[serde(default)]
    pub mappings: BTreeMap<String, MappingSpec>,
}

/// Alias table of one (source, domain) pair.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MappingSpec {
    /// Canonical fields in table order
    #[serde(default)]
    pub fields: Vec<FieldAlias>,

    /// Values stamped onto every mapped record
    #[serde(default)]
    pub constants: FieldValues,
}

/// Aliases of one canonical field, in priority order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldAlias {
    /// Canonical field name
    pub canonical: String,

    /// Source field names, first present wins
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Value transform applied to the matched value
    #[serde(default)]
    pub transform: Option<Transform>,
}

/// Validated schema of one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSchema {
    pub key_field: Option<String>,
    pub fields: Vec<String>,
    /// Lowercase indicator names
    pub indicators: BTreeSet<String>,
}

impl DomainSchema {
    /// Whether `field` belongs to the schema.
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// Validated settings of one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub descriptor: SourceDescriptor,
    pub domain: Option<TargetDomain>,
    exact_hints: BTreeMap<String, TargetDomain>,
    prefix_hints: Vec<(String, TargetDomain)>,
    ignored_hints: BTreeSet<String>,
    default_mode: MergeMode,
    modes: BTreeMap<String, MergeMode>,
    mappings: BTreeMap<TargetDomain, MappingSpec>,
}

/// Immutable routing configuration shared by all routing components.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTables {
    precedence: Vec<TargetDomain>,
    domains: BTreeMap<TargetDomain, DomainSchema>,
    sources: BTreeMap<String, SourceTable>,
    code_tables: BTreeMap<String, CodeTable>,
}

impl RoutingTables {
    /// Built-in tables shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_TABLES)
    }

    /// Load tables from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load tables from `path`, or the built-in set when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    /// Parse and validate tables from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TablesFile = toml::from_str(content)?;
        Self::validate(file)
    }

    /// Validate raw tables.
    pub fn validate(file: TablesFile) -> Result<Self> {
        let precedence = file
            .precedence
            .iter()
            .map(|name| name.parse::<TargetDomain>())
            .collect::<Result<Vec<_>>>()?;
        let distinct: BTreeSet<TargetDomain> = precedence.iter().copied().collect();
        if precedence.len() != TargetDomain::ALL.len() || distinct.len() != precedence.len() {
            return Err(Error::Config(
                "precedence must list every domain exactly once".into(),
            ));
        }

        let mut domains = BTreeMap::new();
        for (name, spec) in file.domains {
            let domain: TargetDomain = name.parse()?;
            if let Some(key) = &spec.key_field {
                if !spec.fields.contains(key) {
                    return Err(Error::Config(format!(
                        "key field '{}' is not a {} field",
                        key, domain
                    )));
                }
            }
            let indicators = spec
                .indicators
                .iter()
                .map(|i| i.to_lowercase())
                .collect();
            domains.insert(
                domain,
                DomainSchema {
                    key_field: spec.key_field,
                    fields: spec.fields,
                    indicators,
                },
            );
        }
        if let Some(missing) = TargetDomain::ALL.iter().find(|d| !domains.contains_key(*d)) {
            return Err(Error::Config(format!("domain '{}' has no schema", missing)));
        }

        let mut claimed: BTreeMap<&str, TargetDomain> = BTreeMap::new();
        for (domain, schema) in &domains {
            for indicator in &schema.indicators {
                if let Some(other) = claimed.insert(indicator.as_str(), *domain) {
                    return Err(Error::Config(format!(
                        "indicator '{}' is claimed by both {} and {}",
                        indicator, other, domain
                    )));
                }
            }
        }

        let mut sources = BTreeMap::new();
        for (name, spec) in file.sources {
            let key = name.to_lowercase();
            let table = build_source(&key, spec, &domains, &file.code_tables)?;
            if sources.insert(key.clone(), table).is_some() {
                return Err(Error::Config(format!("duplicate source '{}'", key)));
            }
        }

        debug!(
            sources = sources.len(),
            code_tables = file.code_tables.len(),
            "Routing tables validated"
        );

        Ok(Self {
            precedence,
            domains,
            sources,
            code_tables: file.code_tables,
        })
    }

    /// Domain precedence, highest first.
    pub fn precedence(&self) -> &[TargetDomain] {
        &self.precedence
    }

    /// Schema of a domain.
    pub fn domain(&self, domain: TargetDomain) -> Option<&DomainSchema> {
        self.domains.get(&domain)
    }

    /// Registered source settings.
    pub fn source(&self, name: &str) -> Option<&SourceTable> {
        self.sources.get(&name.to_lowercase())
    }

    /// Registered source names, lowercase.
    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Descriptor for a source; unregistered sources get the lowest priority.
    pub fn descriptor(&self, name: &str) -> SourceDescriptor {
        match self.source(name) {
            Some(table) => table.descriptor.clone(),
            None => SourceDescriptor {
                name: name.to_lowercase(),
                priority: UNREGISTERED_PRIORITY,
            },
        }
    }

    /// Fixed domain of a single-domain source.
    pub fn fixed_domain(&self, source: &str) -> Option<TargetDomain> {
        self.source(source).and_then(|t| t.domain)
    }

    /// Domain a source-internal type label maps to.
    ///
    /// Exact labels beat prefix labels; among prefix labels the longest wins.
    pub fn hint_domain(&self, source: &str, hint: &str) -> Option<TargetDomain> {
        let table = self.source(source)?;
        let hint = hint.trim().to_lowercase();
        if let Some(domain) = table.exact_hints.get(&hint) {
            return Some(*domain);
        }
        table
            .prefix_hints
            .iter()
            .find(|(prefix, _)| hint.starts_with(prefix.as_str()))
            .map(|(_, domain)| *domain)
    }

    /// Whether batches with this hint are reference data to be ignored.
    pub fn is_ignored_hint(&self, source: &str, hint: &str) -> bool {
        self.source(source)
            .map(|t| t.ignored_hints.contains(&hint.trim().to_lowercase()))
            .unwrap_or(false)
    }

    /// Configured merge mode of (source, canonical field).
    pub fn mode(&self, source: &str, field: &str) -> MergeMode {
        match self.source(source) {
            Some(table) => table
                .modes
                .get(field)
                .copied()
                .unwrap_or(table.default_mode),
            None => MergeMode::default(),
        }
    }

    /// Alias table of (source, domain), if the source defines one.
    pub fn mapping(&self, source: &str, domain: TargetDomain) -> Option<&MappingSpec> {
        self.source(source).and_then(|t| t.mappings.get(&domain))
    }

    /// All code tables.
    pub fn code_tables(&self) -> &BTreeMap<String, CodeTable> {
        &self.code_tables
    }
}

fn build_source(
    name: &str,
    spec: SourceSpec,
    domains: &BTreeMap<TargetDomain, DomainSchema>,
    code_tables: &BTreeMap<String, CodeTable>,
) -> Result<SourceTable> {
    let domain = spec
        .domain
        .as_deref()
        .map(str::parse::<TargetDomain>)
        .transpose()?;

    let mut exact_hints = BTreeMap::new();
    let mut prefix_hints = Vec::new();
    for (label, target) in &spec.hints {
        let target: TargetDomain = target.parse()?;
        let label = label.trim().to_lowercase();
        match label.strip_suffix('*') {
            Some(prefix) => prefix_hints.push((prefix.to_string(), target)),
            None => {
                exact_hints.insert(label, target);
            }
        }
    }
    prefix_hints.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

    let known_field = |field: &str| domains.values().any(|s| s.has_field(field));
    for field in spec.modes.keys() {
        if !known_field(field) {
            return Err(Error::Config(format!(
                "source '{}' sets a mode for unknown field '{}'",
                name, field
            )));
        }
    }

    let mut mappings = BTreeMap::new();
    for (domain_name, mapping) in spec.mappings {
        let target: TargetDomain = domain_name.parse()?;
        let schema = domains
            .get(&target)
            .ok_or_else(|| Error::Config(format!("domain '{}' has no schema", target)))?;
        for alias in &mapping.fields {
            if !schema.has_field(&alias.canonical) {
                return Err(Error::Config(format!(
                    "source '{}' maps onto unknown {} field '{}'",
                    name, target, alias.canonical
                )));
            }
            if let Some(table) = alias.transform.as_ref().and_then(Transform::code_table) {
                if !code_tables.contains_key(table) {
                    return Err(Error::Config(format!(
                        "source '{}' references unknown code table '{}'",
                        name, table
                    )));
                }
            }
        }
        if let Some(field) = mapping.constants.keys().find(|f| !schema.has_field(f)) {
            return Err(Error::Config(format!(
                "source '{}' stamps unknown {} field '{}'",
                name, target, field
            )));
        }
        mappings.insert(target, mapping);
    }

    Ok(SourceTable {
        descriptor: SourceDescriptor {
            name: name.to_string(),
            priority: spec.priority,
        },
        domain,
        exact_hints,
        prefix_hints,
        ignored_hints: spec
            .ignored_hints
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect(),
        default_mode: spec.default_mode,
        modes: spec.modes,
        mappings,
    })
}
