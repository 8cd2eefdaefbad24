use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::cooldown::DenialCooldownPolicy;
use crate::{DenialLedger, DiffResult, KeyIndex, RecordSet, ReconcileConfig, ReconcileError};

/// Key partitions between two snapshots. Each set is key-ordered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeySetDiff {
    pub new_keys: BTreeSet<String>,
    pub deleted_keys: BTreeSet<String>,
    pub modified_keys: BTreeSet<String>,
}

impl KeySetDiff {
    /// Keys classified new or modified; these are never denial candidates.
    pub fn new_or_modified(&self) -> BTreeSet<String> {
        self.new_keys.union(&self.modified_keys).cloned().collect()
    }
}

/// Set reconciliation:
/// - new      = keys in `current` only
/// - deleted  = keys in `previous` only
/// - modified = keys in both whose records are not field-wise equal
pub fn reconcile(previous: &KeyIndex, current: &KeyIndex) -> KeySetDiff {
    let mut out = KeySetDiff::default();

    for (key, cur) in current.iter() {
        match previous.get(key) {
            None => {
                out.new_keys.insert(key.clone());
            }
            Some(prev) if prev != cur => {
                out.modified_keys.insert(key.clone());
            }
            Some(_) => {}
        }
    }

    for key in previous.keys() {
        if !current.contains_key(key) {
            out.deleted_keys.insert(key.to_string());
        }
    }

    out
}

/// Full reconciliation pass with denial cooldown.
///
/// 1. Index both snapshots by `config.key_field`.
/// 2. Partition keys into new / deleted / modified.
/// 3. Candidates = keys in current and in the ledger, minus new and modified.
/// 4. Split candidates by cooldown into resubmit / still denied.
/// 5. Assemble the result; resubmitted records join `new_entries`.
///
/// Pure: same inputs, same output. Every entry list is ordered by key.
pub fn diff(
    config: &ReconcileConfig,
    previous: &RecordSet,
    current: &RecordSet,
    ledger: &DenialLedger,
    now: DateTime<Utc>,
) -> Result<DiffResult, ReconcileError> {
    let previous_index = KeyIndex::build(previous, &config.key_field)?;
    let current_index = KeyIndex::build(current, &config.key_field)?;

    let keys = reconcile(&previous_index, &current_index);

    let excluded = keys.new_or_modified();
    let candidates: BTreeSet<String> = ledger
        .keys()
        .filter(|k| current_index.contains_key(k) && !excluded.contains(*k))
        .map(str::to_string)
        .collect();

    let policy = DenialCooldownPolicy::new(config.cooldown_seconds);
    let cooled = policy.partition(&candidates, ledger, now)?;

    let to_submit: BTreeSet<&String> = keys
        .new_keys
        .iter()
        .chain(cooled.resubmit_keys.iter())
        .collect();

    let denied_keys_to_persist: BTreeMap<String, String> = cooled
        .still_denied_keys
        .iter()
        .filter_map(|k| ledger.get(k).map(|ts| (k.clone(), ts.to_string())))
        .collect();

    let result = DiffResult {
        new_entries: current_index.records_for(to_submit),
        modified_entries: current_index.records_for(&keys.modified_keys),
        deleted_entries: previous_index.records_for(&keys.deleted_keys),
        denied_keys_to_persist,
    };

    tracing::debug!(
        key_field = %config.key_field,
        new = keys.new_keys.len(),
        resubmitted = cooled.resubmit_keys.len(),
        modified = result.modified_entries.len(),
        deleted = result.deleted_entries.len(),
        still_denied = result.denied_keys_to_persist.len(),
        "reconciled snapshots"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Record;
    use chrono::TimeZone;

    fn rec(barcode: &str, item: &str) -> Record {
        Record::new().with("barcode", barcode).with("item", item)
    }

    fn index(records: Vec<Record>) -> KeyIndex {
        KeyIndex::build(&RecordSet::from(records), "barcode").unwrap()
    }

    fn keys(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reconcile_classifies_every_key() {
        let prev = index(vec![rec("1", "a"), rec("2", "b"), rec("3", "c")]);
        let cur = index(vec![rec("2", "b"), rec("3", "C"), rec("4", "d")]);

        let d = reconcile(&prev, &cur);
        assert_eq!(d.new_keys, keys(&["4"]));
        assert_eq!(d.deleted_keys, keys(&["1"]));
        assert_eq!(d.modified_keys, keys(&["3"]));
    }

    #[test]
    fn reconcile_detects_added_field_as_modification() {
        let prev = index(vec![rec("1", "a")]);
        let cur = index(vec![rec("1", "a").with("stop", "CPMCK")]);
        assert_eq!(reconcile(&prev, &cur).modified_keys, keys(&["1"]));
    }

    #[test]
    fn modified_key_on_ledger_is_not_a_candidate() {
        let previous = RecordSet::from(vec![rec("1", "a")]);
        let current = RecordSet::from(vec![rec("1", "changed")]);
        let ledger: DenialLedger = [("1", "2020-06-22T11:36:33")].into_iter().collect();
        let now = Utc.with_ymd_and_hms(2020, 6, 22, 12, 0, 0).unwrap();

        let r = diff(&ReconcileConfig::new("barcode", 172_800), &previous, &current, &ledger, now)
            .unwrap();
        assert_eq!(r.modified_entries, vec![rec("1", "changed")]);
        assert!(r.new_entries.is_empty());
        assert!(r.denied_keys_to_persist.is_empty());
    }

    #[test]
    fn new_key_on_ledger_is_submitted_as_new_and_dropped_from_ledger() {
        let current = RecordSet::from(vec![rec("9", "x")]);
        let ledger: DenialLedger = [("9", "2020-06-22T11:36:33")].into_iter().collect();
        let now = Utc.with_ymd_and_hms(2020, 6, 22, 12, 0, 0).unwrap();

        let r = diff(
            &ReconcileConfig::new("barcode", 172_800),
            &RecordSet::empty(),
            &current,
            &ledger,
            now,
        )
        .unwrap();
        assert_eq!(r.new_entries, vec![rec("9", "x")]);
        assert!(r.denied_keys_to_persist.is_empty());
    }

    #[test]
    fn new_entries_are_key_sorted_across_new_and_resubmitted() {
        let previous = RecordSet::from(vec![rec("2", "b")]);
        let current = RecordSet::from(vec![rec("3", "c"), rec("2", "b"), rec("1", "a")]);
        let ledger: DenialLedger = [("2", "2020-01-01T00:00:00")].into_iter().collect();
        let now = Utc.with_ymd_and_hms(2020, 6, 30, 0, 0, 0).unwrap();

        let r = diff(&ReconcileConfig::new("barcode", 60), &previous, &current, &ledger, now)
            .unwrap();
        let got: Vec<&str> = r
            .new_entries
            .iter()
            .filter_map(|e| e.get_str("barcode"))
            .collect();
        assert_eq!(got, vec!["1", "2", "3"]);
    }

    #[test]
    fn ledger_entry_for_deleted_key_is_not_parsed() {
        // Key only in previous; its corrupt stamp must not abort the run.
        let previous = RecordSet::from(vec![rec("gone", "a")]);
        let ledger: DenialLedger = [("gone", "garbage")].into_iter().collect();
        let now = Utc.with_ymd_and_hms(2020, 6, 30, 0, 0, 0).unwrap();

        let r = diff(
            &ReconcileConfig::new("barcode", 60),
            &previous,
            &RecordSet::empty(),
            &ledger,
            now,
        )
        .unwrap();
        assert_eq!(r.deleted_entries, vec![rec("gone", "a")]);
        assert!(r.denied_keys_to_persist.is_empty());
    }
}
