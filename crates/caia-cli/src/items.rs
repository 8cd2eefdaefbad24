//! CaiaSoft item payloads.
//!
//! Source: `{"endtime", "new": [..], "update": [..]}`; each item is an object
//! of strings. `endtime` is the upper bound of the query window and becomes
//! the next run's `last_timestamp`.
//!
//! New items go out as `{"incoming": [..]}`, updated items as `{"items": [..]}`,
//! each item cut down to `barcode` and `title`.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::dest::count_value;

/// Source field holding the end of the window a response covers.
pub const LAST_TIMESTAMP_FIELD: &str = "endtime";

/// Item fields forwarded to the destination; anything else is dropped.
pub const ITEM_FIELDS: [&str; 2] = ["barcode", "title"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceItems {
    #[serde(default)]
    pub new: Vec<Map<String, Value>>,
    #[serde(default)]
    pub update: Vec<Map<String, Value>>,
}

impl SourceItems {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).context("source response is not an items result")
    }
}

/// `endtime` of a saved source response. Missing, null or blank is `None`.
pub fn last_timestamp(body: &str) -> Result<Option<String>> {
    let v: Value = serde_json::from_str(body).context("source response is not JSON")?;
    Ok(v.get(LAST_TIMESTAMP_FIELD)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

fn dest_item(item: &Map<String, Value>) -> Value {
    let picked: Map<String, Value> = ITEM_FIELDS
        .iter()
        .filter_map(|field| item.get(*field).map(|v| (field.to_string(), v.clone())))
        .collect();
    Value::Object(picked)
}

pub fn new_items_body(items: &[Map<String, Value>]) -> Result<String> {
    let incoming: Vec<Value> = items.iter().map(dest_item).collect();
    serde_json::to_string(&json!({ "incoming": incoming })).context("serialize new items body failed")
}

pub fn updated_items_body(items: &[Map<String, Value>]) -> Result<String> {
    let items: Vec<Value> = items.iter().map(dest_item).collect();
    serde_json::to_string(&json!({ "items": items })).context("serialize updated items body failed")
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewItemsResponse {
    #[serde(default)]
    incoming_count: Option<Value>,
    #[serde(default)]
    rejected_count: Option<Value>,
    #[serde(default)]
    pub rejects: Vec<Value>,
}

impl NewItemsResponse {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).context("dest response is not a new items result")
    }

    pub fn incoming_count(&self) -> Option<u64> {
        count_value(self.incoming_count.as_ref())
    }

    /// Falls back to the length of `rejects`.
    pub fn rejected_count(&self) -> u64 {
        count_value(self.rejected_count.as_ref()).unwrap_or(self.rejects.len() as u64)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatedItemsResponse {
    #[serde(default)]
    total_count: Option<Value>,
    #[serde(default)]
    updated_count: Option<Value>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

impl UpdatedItemsResponse {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).context("dest response is not an updated items result")
    }

    pub fn total_count(&self) -> Option<u64> {
        count_value(self.total_count.as_ref())
    }

    pub fn updated_count(&self) -> Option<u64> {
        count_value(self.updated_count.as_ref())
    }

    pub fn failed_count(&self) -> u64 {
        match (self.total_count(), self.updated_count()) {
            (Some(total), Some(updated)) => total.saturating_sub(updated),
            _ => 0,
        }
    }
}
