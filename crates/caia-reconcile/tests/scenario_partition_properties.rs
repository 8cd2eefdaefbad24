//! Scenario: partition properties
//!
//! # Invariants under test
//!
//! 1. No-op: diffing a snapshot against itself with an empty ledger yields an
//!    empty result.
//! 2. Completeness: with an empty ledger every current key lands exactly once
//!    in new, modified or unchanged; every previous-only key lands exactly
//!    once in deleted.
//! 3. Idempotence: repeated calls with identical inputs give identical results.
//!
//! Snapshots are generated deterministically so the checks cover a spread of
//! overlaps without a property-testing dependency.

use std::collections::BTreeSet;

use caia_reconcile::*;
use chrono::{TimeZone, Utc};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 6, 30, 12, 0, 0).unwrap()
}

/// Snapshot of keys `range` whose `item` field depends on `salt` for keys
/// divisible by `modulus`.
fn snapshot(range: std::ops::Range<u32>, salt: &str, modulus: u32) -> RecordSet {
    range
        .map(|i| {
            let item = if modulus != 0 && i % modulus == 0 {
                format!("item-{i}-{salt}")
            } else {
                format!("item-{i}")
            };
            Record::new()
                .with("barcode", format!("{i:05}"))
                .with("item", item)
        })
        .collect()
}

fn key_of(r: &Record) -> String {
    r.get_str("barcode").unwrap_or_default().to_string()
}

fn key_set(set: &RecordSet) -> BTreeSet<String> {
    set.iter().map(key_of).collect()
}

#[test]
fn no_op_diff_is_empty() {
    let cfg = ReconcileConfig::new("barcode", 60);
    for n in [0u32, 1, 7, 50] {
        let s = snapshot(0..n, "x", 3);
        let r = diff(&cfg, &s, &s, &DenialLedger::empty(), now()).unwrap();
        assert!(r.is_empty(), "self-diff of {n} records must be empty: {r}");
    }
}

#[test]
fn every_key_is_accounted_for_exactly_once() {
    let cfg = ReconcileConfig::new("barcode", 60);
    let cases = [
        (0..10, 5..15, 2),
        (0..10, 0..10, 3),
        (0..0, 0..8, 1),
        (0..8, 0..0, 1),
        (3..30, 0..12, 4),
        (0..20, 20..40, 0),
    ];

    for (prev_range, cur_range, modulus) in cases {
        let previous = snapshot(prev_range.clone(), "prev", modulus);
        let current = snapshot(cur_range.clone(), "cur", modulus);
        let r = diff(&cfg, &previous, &current, &DenialLedger::empty(), now()).unwrap();

        let prev_keys = key_set(&previous);
        let cur_keys = key_set(&current);

        let new: Vec<String> = r.new_entries.iter().map(key_of).collect();
        let modified: Vec<String> = r.modified_entries.iter().map(key_of).collect();
        let deleted: Vec<String> = r.deleted_entries.iter().map(key_of).collect();

        let unchanged: BTreeSet<String> = cur_keys
            .intersection(&prev_keys)
            .filter(|k| !modified.contains(k))
            .cloned()
            .collect();

        // Current keys: new + modified + unchanged, no overlap.
        let mut seen: Vec<String> = new.clone();
        seen.extend(modified.iter().cloned());
        seen.extend(unchanged.iter().cloned());
        seen.sort();
        let expected: Vec<String> = cur_keys.iter().cloned().collect();
        assert_eq!(seen, expected, "case {prev_range:?} -> {cur_range:?}");

        // Previous-only keys: exactly the deleted list.
        let prev_only: Vec<String> = prev_keys.difference(&cur_keys).cloned().collect();
        assert_eq!(deleted, prev_only, "case {prev_range:?} -> {cur_range:?}");

        assert!(r.denied_keys_to_persist.is_empty());
    }
}

#[test]
fn repeated_calls_are_identical() {
    let cfg = ReconcileConfig::new("barcode", 3_600);
    let previous = snapshot(0..25, "a", 2);
    let current = snapshot(10..40, "b", 3);
    let ledger: DenialLedger = [
        ("00012", "2020-06-30T11:30:00"),
        ("00014", "2020-06-01T00:00:00"),
        ("00035", "2020-06-30T11:59:00"),
    ]
    .into_iter()
    .collect();

    let first = diff(&cfg, &previous, &current, &ledger, now()).unwrap();
    for _ in 0..5 {
        assert_eq!(diff(&cfg, &previous, &current, &ledger, now()).unwrap(), first);
    }
}

#[test]
fn entry_lists_are_key_sorted() {
    let cfg = ReconcileConfig::new("barcode", 60);
    let previous: RecordSet = snapshot(0..20, "p", 3).iter().rev().cloned().collect();
    let current: RecordSet = snapshot(10..30, "c", 3).iter().rev().cloned().collect();

    let r = diff(&cfg, &previous, &current, &DenialLedger::empty(), now()).unwrap();
    for list in [&r.new_entries, &r.modified_entries, &r.deleted_entries] {
        let keys: Vec<String> = list.iter().map(key_of).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
