use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use serde_json::json;

use crate::cli::{CliArgs, InitArgs};
use crate::commands::common;
use crate::config::{OutputFormat, normalize_env_key};
use crate::output::json as json_out;

pub fn run(args: &CliArgs, cmd: &InitArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);

    let environment = normalize_env_key(cmd.env.as_deref().unwrap_or("DEV"));
    if environment.is_empty() {
        return Err(anyhow!("Environment name must not be empty"));
    }
    let target = resolve_target_path(cmd.path.as_ref());

    if target.exists() && !cmd.force {
        return Err(anyhow!("Config already exists: {}", target.display()));
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let template = render_config_template(&environment);
    fs::write(&target, template)?;

    if args.quiet {
        return Ok(());
    }

    if matches!(format, OutputFormat::Json) {
        let payload = json!({
            "path": target.display().to_string(),
            "environment": environment,
            "created": true,
            "overwritten": cmd.force,
        });
        let body = json_out::emit_json_value(&payload, common::json_pretty(&resolved))?;
        println!("{}", body);
    } else {
        println!("Wrote config to {}", target.display());
    }

    Ok(())
}

/// A `.yaml`/`.yml`/`.json` path is used as is; anything else is treated as a
/// directory that receives `.ddlplan/config.yaml`.
fn resolve_target_path(path: Option<&PathBuf>) -> PathBuf {
    match path {
        Some(path)
            if path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| matches!(ext, "yaml" | "yml" | "json")) =>
        {
            path.clone()
        }
        Some(dir) => dir.join(".ddlplan").join("config.yaml"),
        None => Path::new(".ddlplan").join("config.yaml"),
    }
}

fn render_config_template(environment: &str) -> String {
    let password_env = format!("DDLPLAN_{environment}_PASSWORD");
    format!(
        r#"# ddlplan configuration

settings:
  output:
    # Values: pretty | markdown | json
    defaultFormat: pretty
    json:
      pretty: true
  audit:
    # JSON lines, one entry per apply or rollback.
    logPath: logs/audit.log
    # Also write dbo.ddl_audit in the target database.
    database: true
  archive:
    # Commit every applied script into a git repository.
    enabled: true
    repoDir: .
    scriptsDir: scripts
  pool:
    reuseConnections: true

environments:
  {environment}:
    server: localhost
    port: 1433
    database: master
    user: sa
    passwordEnv: {password_env}
    encrypt: true
    trustCert: true
    timeout: 30000
"#
    )
}
