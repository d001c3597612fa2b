use std::io::{self, Write};

use anyhow::Result;

use crate::cli::CliArgs;
use crate::commands::common;
use crate::config;
use crate::db::connection::describe_target;
use crate::output::{self, TableOptions, json, table};

pub fn run(args: &CliArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = output::select_format(&args.output, &resolved.settings);

    if args.quiet {
        return Ok(());
    }

    match format {
        config::OutputFormat::Json => {
            let payload = json::config_to_json(&resolved);
            let body = json::emit_json_value(&payload, resolved.settings.output.json_pretty)?;
            println!("{}", body);
        }
        _ => {
            let settings = &resolved.settings;
            let mut rows = vec![
                (
                    "configPath".to_string(),
                    resolved
                        .config_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "(none)".to_string()),
                ),
                (
                    "defaultFormat".to_string(),
                    settings.output.default_format.as_str().to_string(),
                ),
                (
                    "auditLog".to_string(),
                    settings.audit.log_path.display().to_string(),
                ),
                ("auditDatabase".to_string(), settings.audit.database.to_string()),
                ("archive".to_string(), settings.archive.enabled.to_string()),
                (
                    "archiveDir".to_string(),
                    settings
                        .archive
                        .repo_dir
                        .join(&settings.archive.scripts_dir)
                        .display()
                        .to_string(),
                ),
                (
                    "reuseConnections".to_string(),
                    settings.reuse_connections.to_string(),
                ),
                (
                    "maxScriptBytes".to_string(),
                    settings.max_script_bytes.to_string(),
                ),
            ];
            for (name, connection) in &resolved.environments {
                let user = connection.user.as_deref().unwrap_or("(integrated)");
                let password = if connection.password.is_some() { "set" } else { "unset" };
                rows.push((
                    format!("env {name}"),
                    format!("{} as {user}, password {password}", describe_target(connection)),
                ));
            }

            let rendered =
                table::render_key_value_table("Config", &rows, format, &TableOptions::default());
            writeln!(io::stdout(), "{}", rendered)?;
        }
    }

    Ok(())
}
