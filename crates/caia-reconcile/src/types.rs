use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ReconcileError;

/// Default denial cooldown: two days.
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 172_800;

/// One reconciled entity (a hold request, a catalog item, ...).
///
/// Flat mapping from field name to a string or null. Fields are kept in a
/// `BTreeMap` so equality and rendering never depend on source field order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Option<String>>);

impl Record {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert of a string field.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(field.into(), Some(value.into()));
        self
    }

    /// Builder-style insert of a null field.
    pub fn with_null(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), None);
        self
    }

    /// Value of `field`. `None` when absent, `Some(None)` when present but null.
    pub fn get(&self, field: &str) -> Option<Option<&str>> {
        self.0.get(field).map(|v| v.as_deref())
    }

    /// Non-null string value of `field`.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(|v| v.as_deref())
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert a JSON value into a record.
    ///
    /// Only flat objects whose values are strings or null are accepted.
    /// `position` is used for error reporting only.
    pub fn from_value(value: &Value, position: usize) -> Result<Self, ReconcileError> {
        let map = value
            .as_object()
            .ok_or_else(|| ReconcileError::MalformedSnapshot {
                reason: format!("entry {position} is not a JSON object"),
            })?;

        let mut fields = BTreeMap::new();
        for (name, v) in map {
            let field = match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => {
                    return Err(ReconcileError::MalformedSnapshot {
                        reason: format!(
                            "entry {position} field '{name}' is not a string or null: {other}"
                        ),
                    })
                }
            };
            fields.insert(name.clone(), field);
        }
        Ok(Self(fields))
    }

    /// Compact JSON rendering, used in error messages and summaries.
    ///
    /// A string-keyed map of optional strings always serializes; the `Debug`
    /// fallback is never taken.
    pub fn render(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| format!("{:?}", self.0))
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        )
    }
}

/// One snapshot (previous or current) in source order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSet(Vec<Record>);

impl RecordSet {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn records(&self) -> &[Record] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Record>> for RecordSet {
    fn from(records: Vec<Record>) -> Self {
        Self(records)
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Typed engine settings. Paths and secrets stay with the job driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Field whose value identifies a record within a snapshot.
    pub key_field: String,
    /// Minimum seconds after a denial before a key may be resubmitted.
    pub cooldown_seconds: u64,
}

impl ReconcileConfig {
    pub fn new(key_field: impl Into<String>, cooldown_seconds: u64) -> Self {
        Self {
            key_field: key_field.into(),
            cooldown_seconds,
        }
    }
}

/// Output of one reconciliation.
///
/// Every entry sequence is sorted by key value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// New keys plus denied keys whose cooldown has expired.
    pub new_entries: Vec<Record>,
    /// Current-snapshot records whose key exists in both snapshots with
    /// differing fields.
    pub modified_entries: Vec<Record>,
    /// Previous-snapshot records whose key is gone from current.
    pub deleted_entries: Vec<Record>,
    /// Still-denied keys with their original denial timestamps.
    pub denied_keys_to_persist: BTreeMap<String, String>,
}

impl DiffResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `true` when nothing was added, changed, removed or carried over.
    pub fn is_empty(&self) -> bool {
        self.new_entries.is_empty()
            && self.modified_entries.is_empty()
            && self.deleted_entries.is_empty()
            && self.denied_keys_to_persist.is_empty()
    }

    pub fn to_json(&self) -> Result<Value, ReconcileError> {
        serde_json::to_value(self).map_err(|e| ReconcileError::MalformedDiffResult {
            reason: format!("serialize failed: {e}"),
        })
    }

    pub fn to_json_string(&self) -> Result<String, ReconcileError> {
        serde_json::to_string(self).map_err(|e| ReconcileError::MalformedDiffResult {
            reason: format!("serialize failed: {e}"),
        })
    }

    pub fn from_json(value: &Value) -> Result<Self, ReconcileError> {
        serde_json::from_value(value.clone()).map_err(|e| ReconcileError::MalformedDiffResult {
            reason: e.to_string(),
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ReconcileError> {
        serde_json::from_str(json).map_err(|e| ReconcileError::MalformedDiffResult {
            reason: e.to_string(),
        })
    }
}

fn render_records(records: &[Record]) -> String {
    let parts: Vec<String> = records.iter().map(Record::render).collect();
    format!("[{}]", parts.join(", "))
}

impl fmt::Display for DiffResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DiffResult[new_entries: {}, modified_entries: {}, deleted_entries: {}, \
             denied_keys_to_persist: {:?}]",
            render_records(&self.new_entries),
            render_records(&self.modified_entries),
            render_records(&self.deleted_entries),
            self.denied_keys_to_persist
        )
    }
}
