//! Scenario: circrequests job configuration
//!
//! GREEN when:
//! - A base + site overlay load into typed settings with the overlay winning.
//! - The hash is stable across loads and changes with any value.
//! - The shipped layout passes the unused-key guard in FAIL mode.
//! - A pasted API key is refused before settings are ever built.

use caia_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};
use std::path::PathBuf;

const BASE_YAML: &str = r#"
circrequests:
  source_url: "http://aleph.example.edu/holds"
  dest_url: "http://caiasoft.example.com/api/circrequests/v1"
  storage_dir: "storage/circrequests"
  last_success_lookup: "storage/circrequests/last_success.txt"
  denied_keys_filepath: "storage/circrequests/denied_keys.json"
  source_key_field: "item"
library_stops:
  CPMCK: "McKeldin"
  CPHBK: "Hornbake"
secrets:
  caiasoft_api_key_env: "CAIASOFT_API_KEY"
"#;

const SITE_YAML: &str = r#"
circrequests:
  storage_dir: "/var/lib/caia"
  denial_cooldown_seconds: 86400
library_stops:
  CPART: "Art"
"#;

#[test]
fn overlay_wins_and_settings_are_typed() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML, SITE_YAML]).unwrap();
    let s = loaded.circrequests().unwrap();

    assert_eq!(s.storage_dir, PathBuf::from("/var/lib/caia"));
    assert_eq!(s.denial_cooldown_seconds, 86_400);
    assert_eq!(s.source_key_field, "item");
    assert_eq!(s.source_records_field, "holds");
    assert_eq!(s.library_stops.len(), 3);
    assert_eq!(s.reconcile_config().cooldown_seconds, 86_400);
}

#[test]
fn hash_is_stable_and_value_sensitive() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML, SITE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, SITE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);

    let c = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_ne!(a.config_hash, c.config_hash);
}

#[test]
fn shipped_layout_has_no_unused_keys() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML, SITE_YAML]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean(), "unexpected unused keys: {:?}", report.unused_leaf_pointers);
}

#[test]
fn pasted_api_key_is_refused() {
    let leaked = r#"
secrets:
  caiasoft_api_key: "3f9c2a7b-live"
"#;
    let err = load_layered_yaml_from_strings(&[BASE_YAML, leaked]).unwrap_err();
    assert!(err.to_string().contains("CONFIG_SECRET_DETECTED"));
}

#[test]
fn repo_base_config_loads_clean() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..");
    let base = repo_root.join("config/caia.base.yaml");
    let base_s = base.to_string_lossy().to_string();

    let loaded = caia_config::load_layered_yaml(&[base_s.as_str()]).unwrap();
    let s = loaded.circrequests().unwrap();
    assert_eq!(s.source_key_field, "item");
    assert_eq!(s.denial_cooldown_seconds, 172_800);
    let items = loaded.items().unwrap();
    assert_eq!(items.first_run_timestamp.as_deref(), Some("20200101000000"));
    assert!(report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap()
        .is_clean());
}
