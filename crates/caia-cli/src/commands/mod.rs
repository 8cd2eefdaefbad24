//! Command handler modules for caia-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod circrequests;
pub mod diff;
pub mod items;

use std::path::Path;

use anyhow::{bail, Context, Result};
use caia_config::{report_unused_keys, LoadedConfig, ResolvedSecrets, UnusedKeyPolicy};

/// Load layered config and warn about keys no job reads.
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = caia_config::load_layered_yaml(&refs)
        .with_context(|| format!("load config failed: {}", paths.join(", ")))?;

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        tracing::warn!(
            unused = ?report.unused_leaf_pointers,
            "config contains keys no job reads"
        );
    }

    Ok(loaded)
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

/// Collects every precondition failure of a job so they are reported in one
/// `PRECONDITION_FAILED` error.
#[derive(Debug, Default)]
pub struct Preconditions {
    failures: Vec<String>,
}

impl Preconditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.failures.push(message.into());
    }

    pub fn api_key(&mut self, secrets: &ResolvedSecrets) {
        if secrets.caiasoft_api_key.is_none() {
            self.fail(format!(
                "CaiaSoft API key env var '{}' is not set",
                secrets.caiasoft_api_key_env
            ));
        }
    }

    pub fn url(&mut self, name: &str, url: &str) {
        if let Err(reason) = check_url(url) {
            self.fail(format!("{name} '{url}' is not a valid URL: {reason}"));
        }
    }

    pub fn dir_exists(&mut self, name: &str, dir: &Path) {
        if !dir.is_dir() {
            self.fail(format!(
                "{name} '{}' does not exist or is not a directory",
                dir.display()
            ));
        }
    }

    pub fn non_empty(&mut self, name: &str, value: &str) {
        if value.trim().is_empty() {
            self.fail(format!("{name} is empty"));
        }
    }

    /// A file the job creates or rewrites: the path must be set and its
    /// parent directory must exist.
    pub fn state_file(&mut self, name: &str, path: &Path) {
        if path.as_os_str().is_empty() {
            self.fail(format!("{name} is empty"));
            return;
        }
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
                self.fail(format!(
                    "{name} '{}' is in a directory that does not exist",
                    path.display()
                ));
            }
            _ => {}
        }
    }

    pub fn into_failures(self) -> Vec<String> {
        self.failures
    }

    pub fn check(self) -> Result<()> {
        let failures = self.into_failures();
        if !failures.is_empty() {
            bail!("PRECONDITION_FAILED: {}", failures.join("; "));
        }
        Ok(())
    }
}

fn check_url(raw: &str) -> std::result::Result<(), String> {
    let url = reqwest::Url::parse(raw).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host".to_string());
    }
    Ok(())
}
