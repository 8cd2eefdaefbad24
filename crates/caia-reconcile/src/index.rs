//! Key → record lookup for one snapshot.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

use crate::{Record, RecordSet, ReconcileError};

/// Lookup from key value to record, built from exactly one [`RecordSet`].
///
/// Collision policy: when two records share a key value, the one appearing
/// **later** in the snapshot wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyIndex {
    entries: BTreeMap<String, Record>,
}

impl KeyIndex {
    /// Index `records` by the value of `key_field`.
    ///
    /// # Errors
    /// [`ReconcileError::MissingKeyField`] for the first record that lacks the
    /// field or holds null in it.
    pub fn build(records: &RecordSet, key_field: &str) -> Result<Self, ReconcileError> {
        let mut entries: BTreeMap<String, Record> = BTreeMap::new();
        for (record_index, record) in records.iter().enumerate() {
            let key = record
                .get_str(key_field)
                .ok_or_else(|| ReconcileError::MissingKeyField {
                    record_index,
                    record: record.render(),
                    field: key_field.to_string(),
                })?;
            entries.insert(key.to_string(), record.clone());
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn key_set(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Record> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records for `keys` in key order. Keys not in the index are skipped.
    pub(crate) fn records_for<'a, I>(&self, keys: I) -> Vec<Record>
    where
        I: IntoIterator<Item = &'a String>,
    {
        keys.into_iter()
            .filter_map(|k| self.entries.get(k).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(barcode: &str, item: &str) -> Record {
        Record::new().with("barcode", barcode).with("item", item)
    }

    #[test]
    fn builds_lookup_by_key_field() {
        let set = RecordSet::from(vec![rec("123", "abc"), rec("234", "bcd")]);
        let idx = KeyIndex::build(&set, "barcode").unwrap();
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.get("234"), Some(&rec("234", "bcd")));
        assert_eq!(idx.keys().collect::<Vec<_>>(), vec!["123", "234"]);
    }

    #[test]
    fn empty_snapshot_gives_empty_index() {
        let idx = KeyIndex::build(&RecordSet::empty(), "barcode").unwrap();
        assert!(idx.is_empty());
    }

    #[test]
    fn duplicate_key_last_occurrence_wins() {
        let set = RecordSet::from(vec![rec("123", "first"), rec("234", "x"), rec("123", "last")]);
        let idx = KeyIndex::build(&set, "barcode").unwrap();
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.get("123"), Some(&rec("123", "last")));
    }

    #[test]
    fn missing_key_field_names_record_and_field() {
        let set = RecordSet::from(vec![rec("123", "abc"), Record::new().with("item", "orphan")]);
        let err = KeyIndex::build(&set, "barcode").unwrap_err();
        match err {
            ReconcileError::MissingKeyField {
                record_index,
                record,
                field,
            } => {
                assert_eq!(record_index, 1);
                assert_eq!(field, "barcode");
                assert!(record.contains("orphan"));
            }
            other => panic!("expected MissingKeyField, got {other:?}"),
        }
    }

    #[test]
    fn null_key_is_treated_as_missing() {
        let set = RecordSet::from(vec![Record::new().with_null("barcode").with("item", "x")]);
        assert!(matches!(
            KeyIndex::build(&set, "barcode"),
            Err(ReconcileError::MissingKeyField { record_index: 0, .. })
        ));
    }
}
