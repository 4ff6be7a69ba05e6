//! Payload normalization
//!
//! Sits on the critical load path: [`normalize`] is total. Malformed
//! upstream data degrades to "no records for this model" with a logged
//! warning, never an error.

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::{RawPayload, Record, RecordSet};

/// Convert a raw remote payload into a canonical [`RecordSet`].
///
/// Records without an integer `id` are skipped; duplicate ids keep the
/// first occurrence. Field/relation metadata is carried over when the
/// wrapper provides it as an object.
pub fn normalize(model_name: &str, raw: &Value) -> RecordSet {
    match RawPayload::classify(raw) {
        RawPayload::Array(records) => build(model_name, records, None, None),
        RawPayload::Wrapped {
            data,
            fields,
            relations,
        } => build(model_name, data, fields, relations),
        RawPayload::Malformed => {
            tracing::warn!(model = model_name, "malformed payload, storing empty record set");
            RecordSet::empty(model_name)
        }
    }
}

fn build(
    model_name: &str,
    raw_records: &[Value],
    fields: Option<&Value>,
    relations: Option<&Value>,
) -> RecordSet {
    let mut seen: HashSet<i64> = HashSet::with_capacity(raw_records.len());
    let mut records: Vec<Record> = Vec::with_capacity(raw_records.len());

    for value in raw_records {
        let Some(obj) = value.as_object() else {
            tracing::warn!(model = model_name, "skipping non-object record");
            continue;
        };
        let Some(id) = obj.get("id").and_then(Value::as_i64) else {
            tracing::warn!(model = model_name, "skipping record without integer id");
            continue;
        };
        if !seen.insert(id) {
            tracing::warn!(model = model_name, id, "skipping duplicate record id");
            continue;
        }
        records.push(obj.clone());
    }

    RecordSet {
        model_name: model_name.to_string(),
        records,
        field_meta: meta_map(fields),
        relation_meta: meta_map(relations),
    }
}

fn meta_map(value: Option<&Value>) -> Map<String, Value> {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
