//! Value transforms applied while mapping a source field onto a canonical field.

use crate::model::is_empty;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Code to label lookup (e.g. genre id to genre name).
pub type CodeTable = BTreeMap<String, String>;

/// Transform attached to an alias-table entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    /// Bare digits get `prefix` and are zero-padded to `pad` digits.
    /// Values already carrying the prefix pass through; anything else is dropped.
    Prefix {
        prefix: String,
        #[serde(default)]
        pad: usize,
    },
    /// Code or list of codes translated through a code table.
    CodeLabels {
        table: String,
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// List of scalars joined into one string.
    Join {
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// Last `/`-separated segment of a path-like identifier.
    LastSegment,
    /// Numeric strings become JSON numbers.
    Number,
}

fn default_separator() -> String {
    "; ".to_string()
}

impl Transform {
    /// Code table this transform reads, if any.
    pub fn code_table(&self) -> Option<&str> {
        match self {
            Transform::CodeLabels { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Apply the transform. `None` means the value is dropped.
    pub fn apply(&self, value: &Value, code_tables: &BTreeMap<String, CodeTable>) -> Option<Value> {
        let out = match self {
            Transform::Prefix { prefix, pad } => prefixed(value, prefix, *pad),
            Transform::CodeLabels { table, separator } => {
                let codes = code_tables.get(table)?;
                code_labels(value, codes, separator)
            }
            Transform::Join { separator } => joined(value, separator),
            Transform::LastSegment => scalar_text(value)
                .and_then(|s| s.rsplit('/').next().map(str::to_string))
                .filter(|s| !s.is_empty())
                .map(Value::String),
            Transform::Number => numeric(value),
        };
        out.filter(|v| !is_empty(v))
    }
}

/// Text form of a scalar value.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 && n.as_i64().is_none() && n.as_u64().is_none() => {
                Some(format!("{}", f as i64))
            }
            _ => Some(n.to_string()),
        },
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn prefixed(value: &Value, prefix: &str, pad: usize) -> Option<Value> {
    let text = scalar_text(value)?;
    if !prefix.is_empty() && text.starts_with(prefix) {
        return Some(Value::String(text));
    }
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(Value::String(format!("{prefix}{text:0>pad$}")))
}

fn code_labels(value: &Value, codes: &CodeTable, separator: &str) -> Option<Value> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        Value::String(s) => s
            .split(|c: char| c == ',' || c == ';' || c == '|')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        other => scalar_text(other).into_iter().collect(),
    };
    let labels: Vec<&str> = raw
        .iter()
        .filter_map(|code| codes.get(code).map(String::as_str))
        .collect();
    if labels.is_empty() {
        return None;
    }
    Some(Value::String(labels.join(separator)))
}

fn joined(value: &Value, separator: &str) -> Option<Value> {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter(|v| !is_empty(v))
                .filter_map(|v| match v {
                    Value::Object(map) => map.get("name").and_then(scalar_text),
                    other => scalar_text(other),
                })
                .collect();
            Some(Value::String(parts.join(separator)))
        }
        Value::Object(_) | Value::Null => None,
        other => scalar_text(other).map(Value::String),
    }
}

fn numeric(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => {
            let text = s.trim().replace(',', "");
            if let Ok(i) = text.parse::<i64>() {
                return Some(Value::Number(i.into()));
            }
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }
        _ => None,
    }
}
