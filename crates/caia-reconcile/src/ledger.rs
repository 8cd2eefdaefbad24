//! Denial ledger: the only reconciliation state that survives across runs.
//!
//! Maps a record key to the timestamp of its most recent denial by the
//! downstream system. The job driver owns it: it is loaded before a run,
//! consulted by [`diff`](crate::diff), rebuilt with [`DenialLedger::merge`]
//! after submission and persisted in full.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::ReconcileError;

/// Naive ISO-8601 form written by earlier versions of the job (no offset).
const NAIVE_ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DenialLedger(BTreeMap<String, String>);

impl DenialLedger {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parsed denial instant for `key`.
    ///
    /// Returns `Ok(None)` when the key is not in the ledger.
    pub fn denied_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, ReconcileError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(raw) => parse_denial_timestamp(key, raw).map(Some),
        }
    }

    /// Check every entry parses. The job driver runs this right after loading
    /// so a corrupt ledger is reported before anything is fetched.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        for (key, raw) in &self.0 {
            parse_denial_timestamp(key, raw)?;
        }
        Ok(())
    }

    /// Next run's ledger: carried-over entries keep their timestamps, keys
    /// rejected in this run are stamped with `now`.
    pub fn merge<I, S>(carried: &BTreeMap<String, String>, rejected: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stamp = format_denial_timestamp(now);
        let mut next = carried.clone();
        for key in rejected {
            next.insert(key.into(), stamp.clone());
        }
        Self(next)
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl From<BTreeMap<String, String>> for DenialLedger {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K, V> FromIterator<(K, V)> for DenialLedger
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Parse a ledger timestamp as an absolute UTC instant.
///
/// Accepts RFC 3339 (any offset) and naive `YYYY-MM-DDTHH:MM:SS[.f]`, which
/// is read as UTC.
pub fn parse_denial_timestamp(key: &str, raw: &str) -> Result<DateTime<Utc>, ReconcileError> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, NAIVE_ISO_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ReconcileError::CorruptLedgerEntry {
            key: key.to_string(),
            timestamp: raw.to_string(),
        })
}

/// Ledger rendering of a denial instant (RFC 3339, microseconds, `Z`).
pub fn format_denial_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_naive_iso_as_utc() {
        let got = parse_denial_timestamp("k", "2020-06-22T11:36:33").unwrap();
        assert_eq!(got, Utc.with_ymd_and_hms(2020, 6, 22, 11, 36, 33).unwrap());
    }

    #[test]
    fn parses_naive_iso_with_micros() {
        let got = parse_denial_timestamp("k", "2020-06-15T11:36:33.032362").unwrap();
        assert_eq!(got.timestamp_subsec_micros(), 32_362);
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let got = parse_denial_timestamp("k", "2020-06-22T13:36:33+02:00").unwrap();
        assert_eq!(got, Utc.with_ymd_and_hms(2020, 6, 22, 11, 36, 33).unwrap());
    }

    #[test]
    fn garbage_timestamp_is_corrupt_entry() {
        let err = parse_denial_timestamp("31430023550355", "last tuesday").unwrap_err();
        assert_eq!(
            err,
            ReconcileError::CorruptLedgerEntry {
                key: "31430023550355".to_string(),
                timestamp: "last tuesday".to_string(),
            }
        );
    }

    #[test]
    fn formatted_stamp_parses_back() {
        let now = Utc.with_ymd_and_hms(2020, 6, 30, 8, 0, 0).unwrap();
        let s = format_denial_timestamp(now);
        assert_eq!(s, "2020-06-30T08:00:00.000000Z");
        assert_eq!(parse_denial_timestamp("k", &s).unwrap(), now);
    }

    #[test]
    fn validate_reports_first_corrupt_key() {
        let ledger: DenialLedger = [("a", "2020-06-22T11:36:33"), ("b", "nope")]
            .into_iter()
            .collect();
        assert!(matches!(
            ledger.validate(),
            Err(ReconcileError::CorruptLedgerEntry { ref key, .. }) if key == "b"
        ));
    }

    #[test]
    fn denied_at_absent_key_is_none() {
        assert_eq!(DenialLedger::empty().denied_at("x").unwrap(), None);
    }
}
