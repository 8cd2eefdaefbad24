//! CaiaSoft circulation-request payloads.
//!
//! Request: `{"requests": [{"barcode", "request_type": "PYR", "stop"}]}` built
//! from the diff's new entries, with the source stop mapped through
//! `library_stops`.
//!
//! Response: `{"request_count", "results": [{"item", "deny": "Y"|"N"}]}`.
//! Items with `deny == "Y"` are the rejected keys for the ledger.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use caia_reconcile::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pull-your-request: every new hold is sent as this type.
pub const REQUEST_TYPE_PULL: &str = "PYR";

/// Source field naming the pickup location.
pub const STOP_FIELD: &str = "stop";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircRequest {
    pub barcode: String,
    pub request_type: String,
    pub stop: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircRequestsBody {
    pub requests: Vec<CircRequest>,
}

impl CircRequestsBody {
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).context("serialize dest request body failed")
    }
}

/// One destination request per new entry, in entry order.
pub fn build_request_body(
    new_entries: &[Record],
    key_field: &str,
    library_stops: &BTreeMap<String, String>,
) -> Result<CircRequestsBody> {
    let requests = new_entries
        .iter()
        .map(|entry| {
            let barcode = entry
                .get_str(key_field)
                .ok_or_else(|| anyhow!("new entry has no '{key_field}': {}", entry.render()))?;
            let source_stop = entry.get_str(STOP_FIELD).ok_or_else(|| {
                anyhow!("new entry '{barcode}' has no '{STOP_FIELD}' field")
            })?;
            let stop = library_stops.get(source_stop).ok_or_else(|| {
                anyhow!("new entry '{barcode}' has unmapped library stop '{source_stop}'")
            })?;
            Ok(CircRequest {
                barcode: barcode.to_string(),
                request_type: REQUEST_TYPE_PULL.to_string(),
                stop: stop.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CircRequestsBody { requests })
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircRequestResult {
    pub item: String,
    pub deny: String,
}

impl CircRequestResult {
    pub fn is_denied(&self) -> bool {
        self.deny == "Y"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircRequestsResponse {
    #[serde(default)]
    request_count: Option<Value>,
    #[serde(default)]
    pub results: Vec<CircRequestResult>,
}

impl CircRequestsResponse {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).context("dest response is not a circrequests result")
    }

    pub fn request_count(&self) -> Option<u64> {
        count_value(self.request_count.as_ref())
    }

    pub fn denied_items(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.is_denied())
            .map(|r| r.item.clone())
            .collect()
    }

    pub fn processed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_denied()).count()
    }

    pub fn denied_count(&self) -> usize {
        self.results.len() - self.processed_count()
    }
}

/// CaiaSoft counts arrive as JSON numbers or numeric strings.
pub(crate) fn count_value(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
