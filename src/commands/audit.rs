use anyhow::Result;
use serde_json::{Value as JsonValue, json};

use crate::cli::{AuditArgs, CliArgs};
use crate::commands::common;
use crate::config::OutputFormat;
use crate::db::{ConnectionProvider, require_environment};
use crate::error::{AppError, ErrorKind};
use crate::output::{self, TableOptions, json as json_out, table};
use crate::sinks::audit::DEFAULT_AUDIT_LIMIT;
use crate::sinks::{AuditFilter, query_db_audit, read_recent};

const LIMIT_MAX: usize = 5_000;
const FILE_COLUMNS: [&str; 7] = [
    "timestamp",
    "action",
    "env",
    "dryRun",
    "success",
    "rowsAffected",
    "error",
];

pub fn run(args: &CliArgs, cmd: &AuditArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);
    let limit = common::parse_limit(cmd.limit, DEFAULT_AUDIT_LIMIT, LIMIT_MAX);

    if cmd.db {
        return run_db(args, cmd, &resolved, format, limit);
    }

    let entries = filter_entries(
        read_recent(&resolved.settings.audit.log_path, usize::MAX)?,
        cmd,
        limit,
    );

    if args.quiet {
        return Ok(());
    }

    if matches!(format, OutputFormat::Json) {
        let payload = json!({
            "source": resolved.settings.audit.log_path.display().to_string(),
            "count": entries.len(),
            "entries": entries,
        });
        output::print_json(&payload, common::json_pretty(&resolved))?;
        return Ok(());
    }

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            FILE_COLUMNS
                .iter()
                .map(|column| field_text(entry, column))
                .collect()
        })
        .collect();
    println!(
        "{}",
        table::render_rows(&FILE_COLUMNS, &rows, format, &TableOptions::default())
    );
    Ok(())
}

fn run_db(
    args: &CliArgs,
    cmd: &AuditArgs,
    resolved: &crate::config::ResolvedConfig,
    format: OutputFormat,
    limit: usize,
) -> Result<()> {
    let env = cmd.env.as_deref().ok_or_else(|| {
        AppError::new(ErrorKind::Config, "--db needs --env to pick the audited database")
    })?;
    let registry = common::registry(resolved);
    require_environment(&registry, env)?;
    let filter = AuditFilter {
        action: cmd.action.clone(),
        since: cmd.since.clone(),
        until: cmd.until.clone(),
        top: Some(limit),
    };

    let rows = tokio::runtime::Runtime::new()?.block_on(async {
        let mut session = registry.acquire(env).await?;
        let rows = query_db_audit(&mut session, &filter).await;
        registry.release(session).await;
        registry.close_all().await;
        rows
    })?;

    if args.quiet {
        return Ok(());
    }

    if matches!(format, OutputFormat::Json) {
        let payload = json!({
            "source": "dbo.ddl_audit",
            "environment": env,
            "count": rows.rows.len(),
            "entries": json_out::result_set_rows_to_objects(&rows),
        });
        output::print_json(&payload, common::json_pretty(resolved))?;
        return Ok(());
    }

    println!(
        "{}",
        table::render_result_set_table(&rows, format, &TableOptions::default())
    );
    Ok(())
}

/// Applies the env, action and time-window filters, keeping the newest `limit`.
fn filter_entries(entries: Vec<JsonValue>, cmd: &AuditArgs, limit: usize) -> Vec<JsonValue> {
    let matches_text = |entry: &JsonValue, field: &str, wanted: Option<&str>| {
        wanted.is_none_or(|wanted| {
            entry
                .get(field)
                .and_then(JsonValue::as_str)
                .is_some_and(|value| value.eq_ignore_ascii_case(wanted))
        })
    };
    let timestamp = |entry: &JsonValue| {
        entry
            .get("timestamp")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    };

    let kept: Vec<JsonValue> = entries
        .into_iter()
        .filter(|entry| matches_text(entry, "env", cmd.env.as_deref()))
        .filter(|entry| matches_text(entry, "action", cmd.action.as_deref()))
        .filter(|entry| {
            cmd.since
                .as_deref()
                .is_none_or(|since| timestamp(entry).as_str() >= since)
        })
        .filter(|entry| {
            cmd.until
                .as_deref()
                .is_none_or(|until| timestamp(entry).as_str() <= until)
        })
        .collect();
    let start = kept.len().saturating_sub(limit);
    kept.into_iter().skip(start).collect()
}

fn field_text(entry: &JsonValue, field: &str) -> String {
    match entry.get(field) {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> AuditArgs {
        AuditArgs {
            db: false,
            env: None,
            action: None,
            since: None,
            until: None,
            limit: None,
        }
    }

    fn entry(ts: &str, env: &str, action: &str) -> JsonValue {
        json!({ "timestamp": ts, "env": env, "action": action, "success": true })
    }

    #[test]
    fn filters_by_environment_action_and_window() {
        let entries = vec![
            entry("2024-01-01T10:00:00Z", "DEV", "apply"),
            entry("2024-02-01T10:00:00Z", "PROD", "apply"),
            entry("2024-03-01T10:00:00Z", "DEV", "rollback"),
            entry("2024-04-01T10:00:00Z", "DEV", "apply"),
        ];
        let mut cmd = args();
        cmd.env = Some("dev".to_string());
        cmd.action = Some("apply".to_string());
        cmd.since = Some("2024-02".to_string());
        let kept = filter_entries(entries, &cmd, 10);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["timestamp"], "2024-04-01T10:00:00Z");
    }

    #[test]
    fn keeps_the_newest_entries() {
        let entries = (1..=5)
            .map(|day| entry(&format!("2024-01-0{day}T00:00:00Z"), "DEV", "apply"))
            .collect();
        let kept = filter_entries(entries, &args(), 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1]["timestamp"], "2024-01-05T00:00:00Z");
    }

    #[test]
    fn field_text_flattens_json_values() {
        let value = json!({ "success": false, "error": null, "action": "apply" });
        assert_eq!(field_text(&value, "success"), "false");
        assert_eq!(field_text(&value, "error"), "");
        assert_eq!(field_text(&value, "action"), "apply");
    }
}
