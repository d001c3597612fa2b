use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    /// Process environment, after loading `env_file` (or `.env` when present).
    pub fn from_system(env_file: Option<&Path>) -> Self {
        match env_file {
            Some(path) => {
                if let Err(err) = dotenvy::from_path(path) {
                    warn!(path = %path.display(), error = %err, "failed to load env file");
                }
            }
            None => {
                // a missing .env is fine
                let _ = dotenvy::dotenv();
            }
        }
        let vars = std::env::vars().collect();
        Self { vars }
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// `DDLPLAN_<ENV>_<FIELD>`, e.g. `DDLPLAN_DEV_SERVER`.
    pub fn environment_var(&self, environment: &str, field: &str) -> Option<String> {
        self.get(&format!("DDLPLAN_{environment}_{field}"))
            .filter(|v| !v.trim().is_empty())
    }
}

/// Accepts the usual spellings for `DDLPLAN_ARCHIVE`, `DDLPLAN_AUDIT_DB` and
/// the per-environment `ENCRYPT` / `TRUST_CERT` switches.
pub fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "n" | "off" | "disabled" => Some(false),
        _ => None,
    }
}
