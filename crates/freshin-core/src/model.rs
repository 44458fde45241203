//! Core record types shared by the routing components.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Field name to value mapping. Ordered so output is deterministic.
pub type FieldValues = BTreeMap<String, Value>;

/// String values that count as "no value" in upstream exports.
const EMPTY_MARKERS: [&str; 11] = [
    "", "None", "none", "nan", "NaN", "NULL", "null", "N/A", "n/a", "<NA>", "undefined",
];

/// Namespace for content-derived row keys.
const CONTENT_KEY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b0d_4c33_8e57_d1a2_f0c4_b7e9);

/// Canonical record category a record is routed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetDomain {
    /// Title-level metadata (ids, names, dates, scores)
    TitleMetadata,
    /// Rankings, views and watch time
    Viewership,
    /// Which platform carries a title where
    PlatformAvailability,
    /// Trends, hashtags, mentions
    SocialSignal,
    /// Revenue, subscribers, market data
    FinancialSignal,
    /// News items
    NewsEvent,
}

impl TargetDomain {
    /// All domains in declaration order.
    pub const ALL: [TargetDomain; 6] = [
        TargetDomain::TitleMetadata,
        TargetDomain::Viewership,
        TargetDomain::PlatformAvailability,
        TargetDomain::SocialSignal,
        TargetDomain::FinancialSignal,
        TargetDomain::NewsEvent,
    ];

    /// Snake-case name used in configuration and store file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetDomain::TitleMetadata => "title_metadata",
            TargetDomain::Viewership => "viewership",
            TargetDomain::PlatformAvailability => "platform_availability",
            TargetDomain::SocialSignal => "social_signal",
            TargetDomain::FinancialSignal => "financial_signal",
            TargetDomain::NewsEvent => "news_event",
        }
    }
}

impl fmt::Display for TargetDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetDomain {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetDomain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| crate::Error::Config(format!("unknown target domain '{}'", s)))
    }
}

/// Upstream source as resolved from the routing tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Source name (e.g. "tmdb")
    pub name: String,
    /// Priority rank; higher ranks are applied later and win ties
    pub priority: u32,
}

/// A flat record as read from an export, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Source name the record arrived under
    pub source: String,
    /// Source-internal data type tag, if the export carried one
    pub type_hint: Option<String>,
    /// Source-native field names and values
    pub fields: FieldValues,
}

impl RawRecord {
    /// Create a record with no type hint.
    pub fn new(source: impl Into<String>, fields: FieldValues) -> Self {
        Self {
            source: source.into(),
            type_hint: None,
            fields,
        }
    }

    /// Attach a type hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.type_hint = Some(hint.into());
        self
    }
}

/// A record translated onto one domain's canonical schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    /// Domain whose schema the fields belong to
    pub domain: TargetDomain,
    /// Canonical field values (never contains empty values)
    pub fields: FieldValues,
    /// Populated key field value, if the domain has a key and the record carries it
    pub key: Option<String>,
}

impl CanonicalRecord {
    /// Key to store this record under: the key field value, or a key derived
    /// from the record content for keyless records.
    pub fn row_key(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => content_key(self.domain, &self.fields),
        }
    }
}

/// Field write policy for a (source, canonical field) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Write only when the target field is empty
    #[default]
    Merge,
    /// Write unconditionally
    Overwrite,
}

/// Per-field write decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeDecision {
    /// Target already populated and the field is MERGE-mode
    Skip,
    /// Target empty, value written
    Fill,
    /// Field is OVERWRITE-mode, value always written
    Overwrite,
}

impl MergeDecision {
    /// Whether the decision writes a value.
    pub fn writes(&self) -> bool {
        !matches!(self, MergeDecision::Skip)
    }
}

/// Persisted row in a target store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetRow {
    /// Field values currently stored
    pub fields: FieldValues,
}

impl TargetRow {
    /// Create a row from field values.
    pub fn new(fields: FieldValues) -> Self {
        Self { fields }
    }

    /// Field value, if present and non-empty.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !is_empty(v))
    }
}

/// Check if a value is effectively empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => EMPTY_MARKERS.contains(&s.trim()),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Render a key field value as a lookup key.
///
/// Integral floats render without a fraction so `550` and `550.0` agree.
pub fn key_string(value: &Value) -> Option<String> {
    if is_empty(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 && f.abs() < 1e15 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Deterministic key for a record without a key field value.
pub fn content_key(domain: TargetDomain, fields: &FieldValues) -> String {
    // BTreeMap serialization is ordered, so equal content yields equal bytes
    let body = serde_json::to_string(fields).unwrap_or_default();
    let name = format!("{}:{}", domain.as_str(), body);
    Uuid::new_v5(&CONTENT_KEY_NAMESPACE, name.as_bytes()).to_string()
}
