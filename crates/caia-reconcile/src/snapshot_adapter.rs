//! Snapshot adapter: source response JSON → [`RecordSet`].
//!
//! The upstream source answers with a JSON object whose array-valued field
//! (`"holds"` for circulation requests) lists the records. This module pulls
//! that array out and validates every element is a flat string-or-null
//! mapping.
//!
//! - A response without the field is an empty snapshot (the source omits it
//!   when there is nothing to report).
//! - Anything else that does not fit fails fast with
//!   [`ReconcileError::MalformedSnapshot`]; nothing is skipped.

use serde_json::Value;

use crate::{Record, RecordSet, ReconcileError};

/// Field holding the records in a circulation-request source response.
pub const DEFAULT_RECORDS_FIELD: &str = "holds";

/// Extract the snapshot held in `records_field` of a parsed response.
pub fn records_from_response(
    response: &Value,
    records_field: &str,
) -> Result<RecordSet, ReconcileError> {
    let obj = response
        .as_object()
        .ok_or_else(|| ReconcileError::MalformedSnapshot {
            reason: "source response is not a JSON object".to_string(),
        })?;

    let entries = match obj.get(records_field) {
        None | Some(Value::Null) => return Ok(RecordSet::empty()),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(ReconcileError::MalformedSnapshot {
                reason: format!("field '{records_field}' is not an array"),
            })
        }
    };

    entries
        .iter()
        .enumerate()
        .map(|(i, v)| Record::from_value(v, i))
        .collect::<Result<Vec<_>, _>>()
        .map(RecordSet::from)
}

/// Parse a raw response body and extract its snapshot.
pub fn records_from_json(json: &str, records_field: &str) -> Result<RecordSet, ReconcileError> {
    let value: Value = serde_json::from_str(json).map_err(|e| ReconcileError::MalformedSnapshot {
        reason: format!("invalid JSON: {e}"),
    })?;
    records_from_response(&value, records_field)
}
