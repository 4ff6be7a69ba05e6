//! Canonical record sets
//!
//! The remote backend ships reference data in several historical shapes: a
//! bare array of records, a `{data, fields, relations}` wrapper, or (after
//! upstream bugs) something unusable. Everything is folded into one
//! canonical [`RecordSet`] before storage; downstream code never sees a raw
//! payload again.

mod normalizer;

pub use normalizer::normalize;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One domain record: an arbitrary field map with a required integer `id`
pub type Record = Map<String, Value>;

/// Canonicalized collection of domain records for one model, plus
/// field/relation schema metadata.
///
/// Invariant: `records` contains no two entries with the same `id`.
/// Replaced wholesale on each refresh; never merged partially.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSet {
    pub model_name: String,
    pub records: Vec<Record>,
    #[serde(default)]
    pub field_meta: Map<String, Value>,
    #[serde(default)]
    pub relation_meta: Map<String, Value>,
}

impl RecordSet {
    /// An empty set for a model
    pub fn empty(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            records: Vec::new(),
            field_meta: Map::new(),
            relation_meta: Map::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record ids, in record order
    pub fn record_ids(&self) -> Vec<i64> {
        self.records
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_i64))
            .collect()
    }

    /// Find a record by id
    pub fn by_id(&self, id: i64) -> Option<&Record> {
        self.records
            .iter()
            .find(|r| r.get("id").and_then(Value::as_i64) == Some(id))
    }
}

/// A remote payload, classified once before normalization
#[derive(Debug)]
pub enum RawPayload<'a> {
    /// Bare sequence of records
    Array(&'a [Value]),
    /// `{data: [...], fields?, relations?}` wrapper
    Wrapped {
        data: &'a [Value],
        fields: Option<&'a Value>,
        relations: Option<&'a Value>,
    },
    /// Anything else; degrades to an empty set
    Malformed,
}

impl<'a> RawPayload<'a> {
    /// Classify a raw payload. `data` present and a sequence wins; a bare
    /// sequence is second; everything else is malformed.
    pub fn classify(raw: &'a Value) -> Self {
        if let Some(obj) = raw.as_object() {
            return match obj.get("data").and_then(Value::as_array) {
                Some(data) => RawPayload::Wrapped {
                    data,
                    fields: obj.get("fields"),
                    relations: obj.get("relations"),
                },
                None => RawPayload::Malformed,
            };
        }
        match raw.as_array() {
            Some(records) => RawPayload::Array(records),
            None => RawPayload::Malformed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_bare_array() {
        let raw = json!([{"id": 1}]);
        assert!(matches!(RawPayload::classify(&raw), RawPayload::Array(_)));
    }

    #[test]
    fn test_classify_wrapped() {
        let raw = json!({"data": [{"id": 1}], "fields": {"name": {}}});
        match RawPayload::classify(&raw) {
            RawPayload::Wrapped { data, fields, relations } => {
                assert_eq!(data.len(), 1);
                assert!(fields.is_some());
                assert!(relations.is_none());
            }
            other => panic!("expected Wrapped, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_malformed() {
        for raw in [
            json!({"data": "not an array"}),
            json!({}),
            json!(null),
            json!(42),
            json!("x"),
        ] {
            assert!(matches!(RawPayload::classify(&raw), RawPayload::Malformed));
        }
    }

    #[test]
    fn test_record_set_lookup() {
        let set = normalize("products", &json!([{"id": 7, "name": "espresso"}, {"id": 9}]));
        assert_eq!(set.record_ids(), vec![7, 9]);
        assert_eq!(
            set.by_id(7).unwrap().get("name").unwrap().as_str().unwrap(),
            "espresso"
        );
        assert!(set.by_id(8).is_none());
    }
}
