//! caia-artifacts
//!
//! On-disk layout of a CAIA job run:
//!
//! - `<storage_dir>/<job_id>.<descriptor>.<ext>` for every per-run artifact
//!   (source response, diff result, destination request and response).
//! - A last-success lookup file holding the path of the most recent source
//!   response that completed a run; it is the next run's "previous" snapshot.
//! - The denial ledger JSON file, rewritten in full at the end of each
//!   circrequests run. The items job has no ledger.

use anyhow::{Context, Result};
use caia_reconcile::{snapshot_adapter, DenialLedger, RecordSet};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Contents written for an empty first-run source response.
const EMPTY_SOURCE_RESPONSE: &str = "{}\n";

/// Unique id of one job run: `<prefix>.<UTC yyyymmddHHMMSS>-<uuid v4>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobId(String);

impl JobId {
    pub fn new(prefix: &str, started_at: DateTime<Utc>) -> Self {
        Self::with_timestamp(prefix, &started_at.format("%Y%m%d%H%M%S").to_string())
    }

    pub fn with_timestamp(prefix: &str, timestamp: &str) -> Self {
        Self(format!("{prefix}.{timestamp}-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-run artifact files under one storage directory.
#[derive(Debug, Clone)]
pub struct JobArtifacts {
    storage_dir: PathBuf,
    job_id: JobId,
}

impl JobArtifacts {
    pub fn new(storage_dir: impl Into<PathBuf>, job_id: JobId) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            job_id,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn path(&self, descriptor: &str, extension: &str) -> PathBuf {
        self.storage_dir
            .join(format!("{}.{descriptor}.{extension}", self.job_id))
    }

    /// Write (overwrite) an artifact and return its path.
    pub fn write(&self, descriptor: &str, extension: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path(descriptor, extension);
        fs::write(&path, contents)
            .with_context(|| format!("write artifact failed: {}", path.display()))?;
        tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote artifact");
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Last-success lookup
// ---------------------------------------------------------------------------

/// Path recorded in the lookup file (first line, trimmed).
pub fn read_last_success_lookup(lookup: &Path) -> Result<PathBuf> {
    let raw = fs::read_to_string(lookup)
        .with_context(|| format!("read last-success lookup failed: {}", lookup.display()))?;
    let first = raw.lines().next().unwrap_or_default().trim();
    if first.is_empty() {
        anyhow::bail!("last-success lookup is empty: {}", lookup.display());
    }
    Ok(PathBuf::from(first))
}

/// Create the lookup pointing at `first_run_source` (an empty source response,
/// created too) when no lookup exists yet. Existing files are left alone.
pub fn ensure_last_success_lookup(lookup: &Path, first_run_source: &Path) -> Result<()> {
    ensure_last_success_lookup_with(lookup, first_run_source, EMPTY_SOURCE_RESPONSE)
}

/// As [`ensure_last_success_lookup`], seeding a missing first-run file with
/// `first_run_contents`.
pub fn ensure_last_success_lookup_with(
    lookup: &Path,
    first_run_source: &Path,
    first_run_contents: &str,
) -> Result<()> {
    if lookup.exists() {
        return Ok(());
    }
    tracing::warn!(
        lookup = %lookup.display(),
        "last-success lookup not found; creating default"
    );
    if !first_run_source.exists() {
        fs::write(first_run_source, first_run_contents).with_context(|| {
            format!(
                "create first-run source response failed: {}",
                first_run_source.display()
            )
        })?;
    }
    update_last_success(lookup, first_run_source)
}

/// Point the lookup at `source_response` (overwrite).
pub fn update_last_success(lookup: &Path, source_response: &Path) -> Result<()> {
    fs::write(lookup, format!("{}\n", source_response.display()))
        .with_context(|| format!("write last-success lookup failed: {}", lookup.display()))
}

/// Load a saved source response as a snapshot.
pub fn load_snapshot(path: &Path, records_field: &str) -> Result<RecordSet> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read source response failed: {}", path.display()))?;
    snapshot_adapter::records_from_json(&raw, records_field)
        .with_context(|| format!("parse source response failed: {}", path.display()))
}

// ---------------------------------------------------------------------------
// Denial ledger file
// ---------------------------------------------------------------------------

/// Load the ledger, creating an empty `{}` file first if none exists.
pub fn load_ledger(path: &Path) -> Result<DenialLedger> {
    if !path.exists() {
        persist_ledger(path, &DenialLedger::empty())?;
        return Ok(DenialLedger::empty());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read denial ledger failed: {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(DenialLedger::empty());
    }
    serde_json::from_str(&raw)
        .with_context(|| format!("denial ledger is not a key->timestamp object: {}", path.display()))
}

/// Overwrite the ledger file with `ledger`.
pub fn persist_ledger(path: &Path, ledger: &DenialLedger) -> Result<()> {
    let json = serde_json::to_string_pretty(ledger).context("serialize denial ledger failed")?;
    fs::write(path, format!("{json}\n"))
        .with_context(|| format!("write denial ledger failed: {}", path.display()))
}

/// Remove a file if present. Returns whether anything was removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    fs::remove_file(path).with_context(|| format!("remove failed: {}", path.display()))?;
    Ok(true)
}

/// Remove every `*.<extension>` file directly inside `dir` (not recursive).
/// Returns the removed paths, sorted.
pub fn remove_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !dir.is_dir() {
        return Ok(removed);
    }
    let entries = fs::read_dir(dir).with_context(|| format!("list dir failed: {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("list dir failed: {}", dir.display()))?
            .path();
        if path.extension().is_some_and(|ext| ext == extension) && remove_if_exists(&path)? {
            removed.push(path);
        }
    }
    removed.sort();
    Ok(removed)
}
