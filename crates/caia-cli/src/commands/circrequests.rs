//! `caia-cli circrequests`: one sync of Aleph holds into CaiaSoft.
//!
//! Steps, in order; any failure stops the run before the ledger and the
//! last-success lookup are touched, so a failed run is simply retried:
//!
//! 1. load config + secrets, allocate a job id
//! 2. validate preconditions (all failures reported together)
//! 3. ensure the last-success lookup and the ledger file exist
//! 4. GET the source, save the body
//! 5. diff previous vs current against the ledger, save the diff
//! 6. POST new entries to the destination, save request and response
//! 7. merge denials into the ledger, persist it, advance the lookup

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use caia_artifacts::{
    ensure_last_success_lookup, load_ledger, load_snapshot, persist_ledger,
    read_last_success_lookup, remove_files_with_extension, remove_if_exists, update_last_success,
    JobArtifacts, JobId,
};
use caia_config::{resolve_secrets, CircrequestsSettings, ResolvedSecrets};
use caia_reconcile::{snapshot_adapter, DenialLedger, DiffResult};
use chrono::Utc;

use crate::dest::{build_request_body, CircRequestsResponse};
use crate::transport::CaiaHttp;

use super::Preconditions;

pub const JOB_ID_PREFIX: &str = "caia.circrequests";

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub new_entries: usize,
    pub denied_keys: usize,
}

pub async fn run(config_paths: &[String]) -> Result<JobOutcome> {
    let loaded = super::load_config(config_paths)?;
    let settings = loaded.circrequests()?;
    let secrets = resolve_secrets(&loaded.config_json);

    // Single clock read: names the job and is the diff's `now`.
    let started_at = Utc::now();
    let job_id = JobId::new(JOB_ID_PREFIX, started_at);
    tracing::info!(job_id = %job_id, config_hash = %loaded.config_hash, "circrequests job start");

    preconditions(&settings, &secrets).check()?;
    let api_key = secrets.caiasoft_api_key.as_deref().unwrap_or_default();

    ensure_last_success_lookup(&settings.last_success_lookup, &settings.first_run_source_path())?;
    let previous_path = read_last_success_lookup(&settings.last_success_lookup)?;
    if !previous_path.is_file() {
        bail!(
            "PRECONDITION_FAILED: last-success file '{}' named by '{}' does not exist",
            previous_path.display(),
            settings.last_success_lookup.display()
        );
    }
    let ledger = load_ledger(&settings.denied_keys_filepath)?;
    ledger
        .validate()
        .with_context(|| format!("corrupt denial ledger: {}", settings.denied_keys_filepath.display()))?;

    let artifacts = JobArtifacts::new(&settings.storage_dir, job_id.clone());
    let http = CaiaHttp::new();

    // Source
    let source = http.get(&settings.source_url, &[]).await?;
    source.ensure_ok("GET", &settings.source_url)?;
    let source_body_path = artifacts.write("source_response_body", "json", &source.body)?;

    // Diff
    let previous = load_snapshot(&previous_path, &settings.source_records_field)?;
    let current = snapshot_adapter::records_from_json(&source.body, &settings.source_records_field)
        .with_context(|| format!("parse source response failed: {}", settings.source_url))?;
    let diff =
        caia_reconcile::diff(&settings.reconcile_config(), &previous, &current, &ledger, started_at)?;
    artifacts.write("diff_result", "json", &diff.to_json_string()?)?;
    tracing::info!(
        previous = previous.len(),
        current = current.len(),
        new = diff.new_entries.len(),
        modified = diff.modified_entries.len(),
        deleted = diff.deleted_entries.len(),
        still_denied = diff.denied_keys_to_persist.len(),
        "diff complete"
    );

    // Destination
    let rejected = if diff.new_entries.is_empty() {
        tracing::info!("no new entries; nothing to send");
        Vec::new()
    } else {
        send_new_entries(&http, &settings, api_key, &artifacts, &diff).await?
    };
    if !rejected.is_empty() {
        tracing::warn!(denied = ?rejected, "destination denied key(s)");
    }

    // Ledger + lookup
    let next_ledger = DenialLedger::merge(&diff.denied_keys_to_persist, rejected.iter().cloned(), started_at);
    persist_ledger(&settings.denied_keys_filepath, &next_ledger)?;
    update_last_success(&settings.last_success_lookup, &source_body_path)?;

    tracing::info!(job_id = %job_id, ledger_entries = next_ledger.len(), "circrequests job complete");
    Ok(JobOutcome {
        job_id,
        new_entries: diff.new_entries.len(),
        denied_keys: rejected.len(),
    })
}

async fn send_new_entries(
    http: &CaiaHttp,
    settings: &CircrequestsSettings,
    api_key: &str,
    artifacts: &JobArtifacts,
    diff: &DiffResult,
) -> Result<Vec<String>> {
    let body = build_request_body(&diff.new_entries, &settings.source_key_field, &settings.library_stops)?
        .to_json_string()?;
    artifacts.write("dest_request_body", "json", &body)?;

    let reply = http.post_json(&settings.dest_url, api_key, body).await?;
    artifacts.write("dest_response_body", "json", &reply.body)?;
    reply.ensure_ok("POST", &settings.dest_url)?;

    let response = CircRequestsResponse::parse(&reply.body)?;
    let processed = response.processed_count();
    let denied = response.denied_count();
    let total = response.request_count().unwrap_or(response.results.len() as u64);
    tracing::info!(total, processed, denied, "destination response");
    if total == processed as u64 {
        tracing::info!("all requests were processed");
    } else {
        tracing::warn!(denied, "some requests were denied");
    }

    Ok(response.denied_items())
}

/// Every configuration problem that would make the run pointless.
fn preconditions(settings: &CircrequestsSettings, secrets: &ResolvedSecrets) -> Preconditions {
    let mut p = Preconditions::new();
    p.api_key(secrets);
    p.url("source_url", &settings.source_url);
    p.url("dest_url", &settings.dest_url);
    p.dir_exists("storage_dir", &settings.storage_dir);
    p.state_file("last_success_lookup", &settings.last_success_lookup);
    p.state_file("denied_keys_filepath", &settings.denied_keys_filepath);
    p.non_empty("source_key_field", &settings.source_key_field);
    p
}

/// Remove the last-success lookup and the ledger. Returns what was removed.
pub fn reset(config_paths: &[String]) -> Result<Vec<PathBuf>> {
    let loaded = super::load_config(config_paths)?;
    let settings = loaded.circrequests()?;
    reset_state(&settings)
}

/// Remove every `*.json` in the storage dir, then [`reset`].
pub fn clean(config_paths: &[String]) -> Result<Vec<PathBuf>> {
    let loaded = super::load_config(config_paths)?;
    let settings = loaded.circrequests()?;

    let mut removed = reset_state(&settings)?;
    if settings.storage_dir.as_os_str().is_empty() {
        bail!("aborting clean: circrequests storage_dir is not set");
    }
    removed.extend(remove_files_with_extension(&settings.storage_dir, "json")?);
    tracing::info!(removed = removed.len(), "circrequests storage cleaned");
    Ok(removed)
}

fn reset_state(settings: &CircrequestsSettings) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for (name, path) in [
        ("last_success_lookup", &settings.last_success_lookup),
        ("denied_keys_filepath", &settings.denied_keys_filepath),
    ] {
        if path.as_os_str().is_empty() {
            bail!("aborting reset: circrequests {name} is not set");
        }
        if remove_path(path)? {
            removed.push(path.clone());
        }
    }
    tracing::info!(removed = removed.len(), "circrequests state reset");
    Ok(removed)
}

fn remove_path(path: &Path) -> Result<bool> {
    let removed = remove_if_exists(path)?;
    if !removed {
        tracing::info!(path = %path.display(), "nothing to remove");
    }
    Ok(removed)
}
