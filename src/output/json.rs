use serde::Serialize;
use serde_json::json;

use crate::config::{ConnectionSettings, ResolvedConfig};
use crate::db::types::ResultSet;

const MASK: &str = "********";

pub fn emit_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

pub fn emit_json_value(value: &serde_json::Value, pretty: bool) -> anyhow::Result<String> {
    emit_json(value, pretty)
}

pub fn error_json(message: &str, kind: &str) -> serde_json::Value {
    json!({
        "error": {
            "message": message,
            "kind": kind,
        }
    })
}

pub fn result_set_rows_to_objects(result_set: &ResultSet) -> Vec<serde_json::Value> {
    result_set
        .rows
        .iter()
        .map(|row| {
            let mut map = serde_json::Map::new();
            for (col, value) in result_set.columns.iter().zip(row.iter()) {
                let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                map.insert(col.name.clone(), value);
            }
            serde_json::Value::Object(map)
        })
        .collect()
}

pub fn connection_to_json(connection: &ConnectionSettings) -> serde_json::Value {
    json!({
        "server": connection.server,
        "port": connection.port,
        "database": connection.database,
        "user": connection.user,
        "password": connection.password.as_ref().map(|_| MASK),
        "encrypt": connection.encrypt,
        "trustCert": connection.trust_cert,
        "timeoutMs": connection.timeout_ms,
    })
}

pub fn config_to_json(resolved: &ResolvedConfig) -> serde_json::Value {
    let environments: serde_json::Map<String, serde_json::Value> = resolved
        .environments
        .iter()
        .map(|(name, connection)| (name.clone(), connection_to_json(connection)))
        .collect();
    let settings = &resolved.settings;
    json!({
        "configPath": resolved.config_path.as_ref().map(|p| p.display().to_string()),
        "environments": environments,
        "settings": {
            "output": {
                "defaultFormat": settings.output.default_format.as_str(),
                "json": { "pretty": settings.output.json_pretty },
            },
            "audit": {
                "logPath": settings.audit.log_path.display().to_string(),
                "database": settings.audit.database,
            },
            "archive": {
                "enabled": settings.archive.enabled,
                "repoDir": settings.archive.repo_dir.display().to_string(),
                "scriptsDir": settings.archive.scripts_dir,
            },
            "pool": { "reuseConnections": settings.reuse_connections },
            "maxScriptBytes": settings.max_script_bytes,
        }
    })
}
