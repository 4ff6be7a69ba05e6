//! Order wire formatting
//!
//! Local order payloads carry their line/payment sub-structures in at least
//! two historical shapes: tuple-encoded (`[0, 0, {...}]`, from the old
//! command batching format) or object-encoded (`{...}`). Both are folded
//! into one canonical object record before submission; the wire payload
//! always carries object-encoded sequences.

use serde_json::{Value, json};

use super::SyncError;
use crate::queue::OfflineOrder;

/// Build the flat wire payload for an order submission.
///
/// Everything in the local payload passes through; `lines` and `payments`
/// are replaced by their canonical encodings and `state` defaults to
/// `paid` when the capture did not set one.
pub fn to_wire(order: &OfflineOrder) -> Result<Value, SyncError> {
    let Some(payload) = order.payload.as_object() else {
        return Err(SyncError::Payload("order payload is not an object".into()));
    };

    let mut wire = payload.clone();
    wire.insert(
        "lines".into(),
        Value::Array(canonical_records(payload.get("lines"), "line")?),
    );
    wire.insert(
        "payments".into(),
        Value::Array(canonical_records(payload.get("payments"), "payment")?),
    );
    if !wire.contains_key("state") {
        wire.insert("state".into(), json!("paid"));
    }
    Ok(Value::Object(wire))
}

fn canonical_records(value: Option<&Value>, what: &str) -> Result<Vec<Value>, SyncError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let Some(entries) = value.as_array() else {
        return Err(SyncError::Payload(format!("{what} list is not an array")));
    };
    entries
        .iter()
        .map(|entry| canonical_record(entry, what))
        .collect()
}

fn canonical_record(entry: &Value, what: &str) -> Result<Value, SyncError> {
    match entry {
        Value::Object(_) => Ok(entry.clone()),
        // Tuple encoding: the record rides as the object element
        Value::Array(parts) => parts
            .iter()
            .find(|part| part.is_object())
            .cloned()
            .ok_or_else(|| SyncError::Payload(format!("tuple-encoded {what} carries no record"))),
        other => Err(SyncError::Payload(format!(
            "unsupported {what} encoding: {other}"
        ))),
    }
}
