//! Export file parsing.
//!
//! Accepted layouts:
//! - an array of batch envelopes `{source, type | endpoint, data}`
//! - an object whose `results` array holds envelopes
//! - any other array or object: one batch under the file's source

use super::RawBatch;
use crate::error::InputError;
use crate::model::FieldValues;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Keys that hold the record list inside a payload, in lookup order.
const PAYLOAD_KEYS: [&str; 5] = ["data", "results", "items", "titles", "shows"];

/// Parse an export into batches.
pub fn parse_export(file_id: &str, source: &str, bytes: &[u8]) -> Result<Vec<RawBatch>, InputError> {
    let document: Value = serde_json::from_slice(bytes).map_err(|e| InputError::Malformed {
        file_id: file_id.to_string(),
        message: e.to_string(),
    })?;

    let batches = match &document {
        Value::Array(items) if items.iter().any(is_envelope) => envelopes(items, source),
        Value::Object(map) => match map.get("results") {
            Some(Value::Array(items)) if items.iter().any(is_envelope) => envelopes(items, source),
            _ => vec![RawBatch {
                source: source.to_string(),
                type_hint: None,
                records: payload_records(&document),
            }],
        },
        Value::Array(_) => vec![RawBatch {
            source: source.to_string(),
            type_hint: None,
            records: payload_records(&document),
        }],
        _ => {
            return Err(InputError::Malformed {
                file_id: file_id.to_string(),
                message: "expected a JSON array or object".into(),
            })
        }
    };

    debug!(
        file_id,
        batches = batches.len(),
        records = batches.iter().map(|b| b.records.len()).sum::<usize>(),
        "Parsed export"
    );
    Ok(batches)
}

fn is_envelope(value: &Value) -> bool {
    value.as_object().map_or(false, is_envelope_map)
}

fn is_envelope_map(map: &Map<String, Value>) -> bool {
    let tagged = ["source", "type", "endpoint"]
        .iter()
        .any(|key| map.get(*key).map_or(false, Value::is_string));
    tagged && PAYLOAD_KEYS.iter().any(|key| map.contains_key(*key))
}

fn envelopes(items: &[Value], default_source: &str) -> Vec<RawBatch> {
    items
        .iter()
        .filter_map(Value::as_object)
        .filter(|map| is_envelope_map(map))
        .map(|map| {
            let source = text(map, "source").unwrap_or(default_source).to_string();
            let type_hint = text(map, "type")
                .or_else(|| text(map, "endpoint"))
                .map(str::to_string);
            let payload = PAYLOAD_KEYS
                .iter()
                .find_map(|key| map.get(*key))
                .cloned()
                .unwrap_or(Value::Null);
            RawBatch {
                source,
                type_hint,
                records: payload_records(&payload),
            }
        })
        .collect()
}

fn text<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

/// Records inside a batch payload.
fn payload_records(payload: &Value) -> Vec<FieldValues> {
    match payload {
        Value::Array(items) => items.iter().filter_map(record).collect(),
        Value::Object(map) => {
            if let (Some(Value::Array(changes)), Some(shows)) = (map.get("changes"), map.get("shows")) {
                return expand_changes(changes, shows);
            }
            for key in PAYLOAD_KEYS {
                if let Some(Value::Array(items)) = map.get(key) {
                    return items.iter().filter_map(record).collect();
                }
            }
            record(payload).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// One record from a payload item. Items wrapping their fields in a `data`
/// object are unwrapped, keeping outer fields the inner object lacks.
fn record(item: &Value) -> Option<FieldValues> {
    let map = item.as_object()?;
    let mut fields: FieldValues = match map.get("data") {
        Some(Value::Object(inner)) => inner.clone().into_iter().collect(),
        _ => return Some(map.clone().into_iter().collect()),
    };
    for (key, value) in map {
        if key != "data" {
            fields.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    Some(fields)
}

/// Expand a `{changes, shows}` payload into one record per change, joined
/// with the show it refers to. Change fields win over show fields.
fn expand_changes(changes: &[Value], shows: &Value) -> Vec<FieldValues> {
    let index: HashMap<String, &Map<String, Value>> = match shows {
        Value::Object(map) => map
            .iter()
            .filter_map(|(id, show)| show.as_object().map(|s| (id.clone(), s)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|s| id_text(s.get("id")?).map(|id| (id, s)))
            .collect(),
        _ => HashMap::new(),
    };

    changes
        .iter()
        .filter_map(Value::as_object)
        .map(|change| {
            let show = ["showId", "show_id", "itemId"]
                .iter()
                .find_map(|key| change.get(*key).and_then(id_text))
                .and_then(|id| index.get(&id));

            let mut fields = FieldValues::new();
            if let Some(show) = show {
                fields.extend(show.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            for (key, value) in change {
                // Nested references such as {"service": {"id": "netflix"}} collapse to the id
                let value = match value {
                    Value::Object(inner) => inner.get("id").cloned().unwrap_or(Value::Null),
                    other => other.clone(),
                };
                fields.insert(key.clone(), value);
            }
            fields
        })
        .collect()
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
