//! Typed settings for the circrequests and items jobs.
//!
//! Config layout (YAML):
//!
//! ```yaml
//! circrequests:
//!   source_url: "https://aleph.example.edu/holds"
//!   dest_url: "https://caiasoft.example.com/api/circrequests/v1"
//!   storage_dir: "storage/circrequests"
//!   last_success_lookup: "storage/circrequests/last_success.txt"
//!   denied_keys_filepath: "storage/circrequests/denied_keys.json"
//!   source_key_field: "item"
//!   source_records_field: "holds"        # optional
//!   denial_cooldown_seconds: 172800      # optional
//! library_stops:
//!   CPMCK: "McKeldin"
//! items:
//!   source_url: "https://aleph.example.edu/items"
//!   dest_new_url: "https://caiasoft.example.com/api/incoming/v1"
//!   dest_updates_url: "https://caiasoft.example.com/api/itemupdates/v1"
//!   storage_dir: "storage/items"
//!   last_success_lookup: "storage/items/last_success.txt"
//!   first_run_timestamp: "20200101000000"  # optional
//! secrets:
//!   caiasoft_api_key_env: "CAIASOFT_API_KEY"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use caia_reconcile::{snapshot_adapter::DEFAULT_RECORDS_FIELD, ReconcileConfig, DEFAULT_COOLDOWN_SECONDS};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// File name of the empty "first run" source response created next to the
/// job's storage when no last-success lookup exists yet.
pub const DEFAULT_LAST_SUCCESS_FIRST_FILE: &str = "circrequests_FIRST.json";

/// Items counterpart of [`DEFAULT_LAST_SUCCESS_FIRST_FILE`].
pub const DEFAULT_ITEMS_FIRST_FILE: &str = "items_FIRST.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCircrequests {
    #[serde(default)]
    source_url: String,
    #[serde(default)]
    dest_url: String,
    #[serde(default)]
    storage_dir: String,
    #[serde(default)]
    last_success_lookup: String,
    #[serde(default)]
    denied_keys_filepath: String,
    #[serde(default)]
    source_key_field: String,
    #[serde(default)]
    source_records_field: Option<String>,
    #[serde(default)]
    denial_cooldown_seconds: Option<u64>,
}

/// Everything the circrequests job reads from config (secrets excluded).
///
/// Blank strings are kept as-is here; the job's precondition check reports
/// them all at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircrequestsSettings {
    pub source_url: String,
    pub dest_url: String,
    pub storage_dir: PathBuf,
    pub last_success_lookup: PathBuf,
    pub denied_keys_filepath: PathBuf,
    pub source_key_field: String,
    pub source_records_field: String,
    pub denial_cooldown_seconds: u64,
    /// Source pickup location → destination stop code.
    pub library_stops: BTreeMap<String, String>,
}

impl CircrequestsSettings {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let section = config_json
            .pointer("/circrequests")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let raw: RawCircrequests =
            serde_json::from_value(section).context("invalid 'circrequests' config section")?;

        let library_stops: BTreeMap<String, String> = match config_json.pointer("/library_stops") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(v) => serde_json::from_value(v.clone())
                .context("'library_stops' must map stop codes to strings")?,
        };

        Ok(Self {
            source_url: raw.source_url.trim().to_string(),
            dest_url: raw.dest_url.trim().to_string(),
            storage_dir: PathBuf::from(raw.storage_dir.trim()),
            last_success_lookup: PathBuf::from(raw.last_success_lookup.trim()),
            denied_keys_filepath: PathBuf::from(raw.denied_keys_filepath.trim()),
            source_key_field: raw.source_key_field.trim().to_string(),
            source_records_field: raw
                .source_records_field
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_RECORDS_FIELD.to_string()),
            denial_cooldown_seconds: raw
                .denial_cooldown_seconds
                .unwrap_or(DEFAULT_COOLDOWN_SECONDS),
            library_stops,
        })
    }

    /// Engine settings handed to the reconciler.
    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig::new(self.source_key_field.clone(), self.denial_cooldown_seconds)
    }

    /// Default target of a freshly created last-success lookup.
    pub fn first_run_source_path(&self) -> PathBuf {
        self.storage_dir.join(DEFAULT_LAST_SUCCESS_FIRST_FILE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawItems {
    #[serde(default)]
    source_url: String,
    #[serde(default)]
    dest_new_url: String,
    #[serde(default)]
    dest_updates_url: String,
    #[serde(default)]
    storage_dir: String,
    #[serde(default)]
    last_success_lookup: String,
    #[serde(default)]
    first_run_timestamp: Option<String>,
}

/// Everything the items job reads from config (secrets excluded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemsSettings {
    pub source_url: String,
    pub dest_new_url: String,
    pub dest_updates_url: String,
    pub storage_dir: PathBuf,
    pub last_success_lookup: PathBuf,
    /// `last_timestamp` sent on the very first run, when there is no previous
    /// source response to read `endtime` from.
    pub first_run_timestamp: Option<String>,
}

impl ItemsSettings {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let section = config_json
            .pointer("/items")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let raw: RawItems = serde_json::from_value(section).context("invalid 'items' config section")?;

        Ok(Self {
            source_url: raw.source_url.trim().to_string(),
            dest_new_url: raw.dest_new_url.trim().to_string(),
            dest_updates_url: raw.dest_updates_url.trim().to_string(),
            storage_dir: PathBuf::from(raw.storage_dir.trim()),
            last_success_lookup: PathBuf::from(raw.last_success_lookup.trim()),
            first_run_timestamp: raw
                .first_run_timestamp
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }

    pub fn first_run_source_path(&self) -> PathBuf {
        self.storage_dir.join(DEFAULT_ITEMS_FIRST_FILE)
    }
}
