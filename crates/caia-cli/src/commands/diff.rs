//! `caia-cli diff`: reconcile two saved source responses offline.

use std::path::Path;

use anyhow::{bail, Context, Result};
use caia_artifacts::{load_ledger, load_snapshot};
use caia_reconcile::{parse_denial_timestamp, DenialLedger, DiffResult, ReconcileConfig};
use chrono::{DateTime, Utc};

pub struct DiffArgs {
    pub key_field: String,
    pub previous: String,
    pub current: String,
    pub ledger: Option<String>,
    pub cooldown_seconds: u64,
    pub now: Option<String>,
    pub records_field: String,
}

/// Read-only: nothing is written. Without `--ledger` the ledger is empty; a
/// `--ledger` path that does not exist is an error.
pub fn run(args: DiffArgs) -> Result<DiffResult> {
    let previous = load_snapshot(Path::new(&args.previous), &args.records_field)?;
    let current = load_snapshot(Path::new(&args.current), &args.records_field)?;
    let ledger = match args.ledger.as_deref() {
        Some(path) => read_ledger(Path::new(path))?,
        None => DenialLedger::empty(),
    };
    let now = parse_now(args.now.as_deref())?;

    let config = ReconcileConfig::new(args.key_field, args.cooldown_seconds);
    let result = caia_reconcile::diff(&config, &previous, &current, &ledger, now)?;
    Ok(result)
}

fn read_ledger(path: &Path) -> Result<DenialLedger> {
    if !path.is_file() {
        bail!("denial ledger not found: {}", path.display());
    }
    load_ledger(path)
}

fn parse_now(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        Some(s) => parse_denial_timestamp("--now", s).context("invalid --now"),
        None => Ok(Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn now_accepts_rfc3339_and_naive() {
        let expected = Utc.with_ymd_and_hms(2020, 6, 30, 8, 0, 0).unwrap();
        assert_eq!(parse_now(Some("2020-06-30T08:00:00Z")).unwrap(), expected);
        assert_eq!(parse_now(Some("2020-06-30T08:00:00")).unwrap(), expected);
        assert!(parse_now(Some("yesterday")).is_err());
    }

    #[test]
    fn missing_ledger_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent.json");
        let err = read_ledger(&absent).unwrap_err();
        assert!(err.to_string().contains("denial ledger not found"), "{err}");
        assert!(!absent.exists());
    }

    #[test]
    fn existing_ledger_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("denied.json");
        std::fs::write(&path, r#"{"A": "2020-06-30T08:00:00Z"}"#).unwrap();
        let ledger = read_ledger(&path).unwrap();
        assert_eq!(ledger.get("A"), Some("2020-06-30T08:00:00Z"));
    }
}
