//! `caia-cli items`: one sync of new and updated Aleph items into CaiaSoft.
//!
//! The source is queried for the window between the previous successful
//! response's `endtime` and now. Any failure stops the run before the
//! last-success lookup moves, so the same window is queried again next time.
//!
//! 1. load config + secrets, allocate a job id
//! 2. validate preconditions (all failures reported together)
//! 3. read `last_timestamp` from the previous successful response
//! 4. GET the source with `last_timestamp` and `current_timestamp`, save the body
//! 5. POST new items, then updated items; an empty list is not sent
//! 6. advance the lookup

use anyhow::{bail, Context, Result};
use caia_artifacts::{
    ensure_last_success_lookup_with, read_last_success_lookup, update_last_success, JobArtifacts,
    JobId,
};
use caia_config::{resolve_secrets, ItemsSettings, ResolvedSecrets};
use chrono::Utc;
use serde_json::json;

use crate::items::{
    last_timestamp, new_items_body, updated_items_body, NewItemsResponse, SourceItems,
    UpdatedItemsResponse, LAST_TIMESTAMP_FIELD,
};
use crate::transport::CaiaHttp;

use super::Preconditions;

pub const JOB_ID_PREFIX: &str = "caia.items";

#[derive(Debug, Clone)]
pub struct ItemsOutcome {
    pub job_id: JobId,
    pub new_items: usize,
    pub updated_items: usize,
}

pub async fn run(config_paths: &[String]) -> Result<ItemsOutcome> {
    let loaded = super::load_config(config_paths)?;
    let settings = loaded.items()?;
    let secrets = resolve_secrets(&loaded.config_json);

    // Single clock read: names the job and closes the query window.
    let started_at = Utc::now();
    let job_id = JobId::new(JOB_ID_PREFIX, started_at);
    tracing::info!(job_id = %job_id, config_hash = %loaded.config_hash, "items job start");

    preconditions(&settings, &secrets).check()?;
    let api_key = secrets.caiasoft_api_key.as_deref().unwrap_or_default();

    if let Some(first) = &settings.first_run_timestamp {
        let seed = json!({ LAST_TIMESTAMP_FIELD: first }).to_string();
        ensure_last_success_lookup_with(&settings.last_success_lookup, &settings.first_run_source_path(), &seed)?;
    }
    let previous_path = read_last_success_lookup(&settings.last_success_lookup)?;
    if !previous_path.is_file() {
        bail!(
            "PRECONDITION_FAILED: last-success file '{}' named by '{}' does not exist",
            previous_path.display(),
            settings.last_success_lookup.display()
        );
    }

    let previous = std::fs::read_to_string(&previous_path)
        .with_context(|| format!("read source response failed: {}", previous_path.display()))?;
    let Some(last) = last_timestamp(&previous)
        .with_context(|| format!("parse source response failed: {}", previous_path.display()))?
    else {
        bail!("could not find timestamp in {}", previous_path.display());
    };
    let current = started_at.format("%Y%m%d%H%M%S").to_string();
    tracing::info!(last_timestamp = %last, current_timestamp = %current, "query window");

    let artifacts = JobArtifacts::new(&settings.storage_dir, job_id.clone());
    let http = CaiaHttp::new();

    // Source
    let source = http
        .get(
            &settings.source_url,
            &[("last_timestamp", last.as_str()), ("current_timestamp", current.as_str())],
        )
        .await?;
    let source_body_path = artifacts.write("source_response_body", "json", &source.body)?;
    source.ensure_ok("GET", &settings.source_url)?;
    let items = SourceItems::parse(&source.body)
        .with_context(|| format!("parse source response failed: {}", settings.source_url))?;
    tracing::info!(new = items.new.len(), updated = items.update.len(), "source items");

    // Destination
    if items.new.is_empty() {
        tracing::info!("no new items; nothing to send");
    } else {
        send_new_items(&http, &settings, api_key, &artifacts, &items).await?;
    }
    if items.update.is_empty() {
        tracing::info!("no updated items; nothing to send");
    } else {
        send_updated_items(&http, &settings, api_key, &artifacts, &items).await?;
    }

    update_last_success(&settings.last_success_lookup, &source_body_path)?;

    tracing::info!(job_id = %job_id, "items job complete");
    Ok(ItemsOutcome {
        job_id,
        new_items: items.new.len(),
        updated_items: items.update.len(),
    })
}

async fn send_new_items(
    http: &CaiaHttp,
    settings: &ItemsSettings,
    api_key: &str,
    artifacts: &JobArtifacts,
    items: &SourceItems,
) -> Result<()> {
    let body = new_items_body(&items.new)?;
    artifacts.write("dest_new_items_request_body", "json", &body)?;

    let reply = http.post_json(&settings.dest_new_url, api_key, body).await?;
    artifacts.write("dest_new_items_response_body", "json", &reply.body)?;
    reply.ensure_ok("POST", &settings.dest_new_url)?;

    let response = NewItemsResponse::parse(&reply.body)?;
    let rejected = response.rejected_count();
    tracing::info!(
        incoming = response.incoming_count().unwrap_or(items.new.len() as u64),
        rejected,
        rejects = response.rejects.len(),
        "new items response"
    );
    if response.rejects.is_empty() {
        tracing::info!("all new items were processed");
    } else {
        tracing::warn!(rejected, rejects = ?response.rejects, "some new items were rejected");
    }
    Ok(())
}

async fn send_updated_items(
    http: &CaiaHttp,
    settings: &ItemsSettings,
    api_key: &str,
    artifacts: &JobArtifacts,
    items: &SourceItems,
) -> Result<()> {
    let body = updated_items_body(&items.update)?;
    artifacts.write("dest_updated_items_request_body", "json", &body)?;

    let reply = http.post_json(&settings.dest_updates_url, api_key, body).await?;
    artifacts.write("dest_updated_items_response_body", "json", &reply.body)?;
    reply.ensure_ok("POST", &settings.dest_updates_url)?;

    let response = UpdatedItemsResponse::parse(&reply.body)?;
    let failed = response.failed_count();
    tracing::info!(
        total = response.total_count().unwrap_or(items.update.len() as u64),
        updated = response.updated_count().unwrap_or_default(),
        failed,
        errors = ?response.errors,
        "updated items response"
    );
    if failed == 0 && response.errors.is_empty() {
        tracing::info!("all items were updated");
    } else {
        tracing::warn!(failed, errors = response.errors.len(), "some item updates failed");
    }
    Ok(())
}

fn preconditions(settings: &ItemsSettings, secrets: &ResolvedSecrets) -> Preconditions {
    let mut p = Preconditions::new();
    p.api_key(secrets);
    p.url("source_url", &settings.source_url);
    p.url("dest_new_url", &settings.dest_new_url);
    p.url("dest_updates_url", &settings.dest_updates_url);
    p.dir_exists("storage_dir", &settings.storage_dir);
    p.state_file("last_success_lookup", &settings.last_success_lookup);
    let lookup = &settings.last_success_lookup;
    if !lookup.as_os_str().is_empty() && !lookup.exists() && settings.first_run_timestamp.is_none() {
        p.fail(format!(
            "last_success_lookup '{}' does not exist and items.first_run_timestamp is not set",
            lookup.display()
        ));
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings(storage_dir: PathBuf) -> ItemsSettings {
        ItemsSettings {
            source_url: "http://aleph.example.edu/items".to_string(),
            dest_new_url: "https://caiasoft.example.com/api/incoming/v1".to_string(),
            dest_updates_url: "https://caiasoft.example.com/api/itemupdates/v1".to_string(),
            last_success_lookup: storage_dir.join("last_success.txt"),
            storage_dir,
            first_run_timestamp: Some("20200101000000".to_string()),
        }
    }

    fn secrets(key: Option<&str>) -> ResolvedSecrets {
        ResolvedSecrets {
            caiasoft_api_key_env: "CAIASOFT_API_KEY".to_string(),
            caiasoft_api_key: key.map(str::to_string),
        }
    }

    #[test]
    fn valid_setup_has_no_failures() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path().to_path_buf());
        assert!(preconditions(&s, &secrets(Some("k"))).into_failures().is_empty());
    }

    #[test]
    fn every_failure_is_reported() {
        let mut s = settings(PathBuf::from("/definitely/not/here"));
        s.dest_new_url = "not a url".to_string();
        s.dest_updates_url = String::new();
        s.first_run_timestamp = None;

        let failures = preconditions(&s, &secrets(None)).into_failures();
        assert_eq!(failures.len(), 6, "{failures:?}");
        assert!(failures[0].contains("CAIASOFT_API_KEY"));
        assert!(failures[1].starts_with("dest_new_url"));
        assert!(failures[2].starts_with("dest_updates_url"));
        assert!(failures[3].contains("storage_dir"));
        assert!(failures[4].starts_with("last_success_lookup"));
        assert!(failures[5].contains("items.first_run_timestamp"), "{}", failures[5]);
    }

    #[test]
    fn existing_lookup_needs_no_first_run_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path().to_path_buf());
        s.first_run_timestamp = None;
        std::fs::write(&s.last_success_lookup, "x\n").unwrap();
        assert!(preconditions(&s, &secrets(Some("k"))).into_failures().is_empty());
    }
}
