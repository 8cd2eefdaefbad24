//! Runtime secret resolution.
//!
//! Config stores only the NAME of the env var holding the CaiaSoft API key
//! (`/secrets/caiasoft_api_key_env`). The job resolves it once at startup and
//! passes the result around; nothing else reads the environment for secrets.
//! `Debug` output and error messages never contain the value.

use serde_json::Value;

/// Env var consulted when the config does not name one.
pub const DEFAULT_API_KEY_ENV: &str = "CAIASOFT_API_KEY";

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Name of the env var the key was read from (safe to log).
    pub caiasoft_api_key_env: String,
    /// `None` when the env var is unset or blank.
    pub caiasoft_api_key: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("caiasoft_api_key_env", &self.caiasoft_api_key_env)
            .field(
                "caiasoft_api_key",
                &self.caiasoft_api_key.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve secrets named by `config_json` from the environment.
///
/// A missing key is not an error here: the job's precondition step reports
/// it together with every other configuration problem.
pub fn resolve_secrets(config_json: &Value) -> ResolvedSecrets {
    let var = read_str_at(config_json, "/secrets/caiasoft_api_key_env")
        .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
    ResolvedSecrets {
        caiasoft_api_key: resolve_env(&var),
        caiasoft_api_key_env: var,
    }
}
