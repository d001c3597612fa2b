use anyhow::Result;
use tracing::debug;

use crate::cli::{CliArgs, RunArgs};
use crate::commands::common;
use crate::config::{OutputFormat, ResolvedConfig};
use crate::error::{AppError, ErrorKind};
use crate::execute::{self, ApplyAction, ApplyOutcome, ApplyRequest};
use crate::output::{self, plan as plan_out};
use crate::sinks::{AuditSink, DbAuditSink, FileAuditSink, GitArchive, ScriptArchive};

fn build_request(
    cmd: &RunArgs,
    action: ApplyAction,
    resolved: &ResolvedConfig,
) -> Result<ApplyRequest> {
    let script = common::read_script(&cmd.file, resolved)?;
    let mut request = ApplyRequest::new(&cmd.env, action, script);
    if action == ApplyAction::Apply {
        if let Some(path) = &cmd.rollback_file {
            request.rollback_script = Some(common::read_script(path, resolved)?);
        }
    }
    request.dry_run = cmd.dry_run;
    request.auto_create_schemas = cmd.auto_create_schemas;
    request.user = cmd.user.clone();
    request.correlation_id = cmd.correlation_id.clone();
    request.objects = common::parse_objects(&cmd.objects)?
        .iter()
        .map(|object| format!("{}.{}", object.schema, object.name))
        .collect();
    Ok(request)
}

pub fn run(args: &CliArgs, cmd: &RunArgs, action: ApplyAction) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);
    let request = build_request(cmd, action, &resolved)?;
    let registry = common::registry(&resolved);

    let file_audit = FileAuditSink::new(&resolved.settings.audit.log_path);
    let db_audit = DbAuditSink::new(&registry);
    let mut audit: Vec<&dyn AuditSink> = vec![&file_audit];
    if resolved.settings.audit.database {
        audit.push(&db_audit);
    }
    let git = resolved.settings.archive.enabled.then(|| {
        GitArchive::new(
            &resolved.settings.archive.repo_dir,
            &resolved.settings.archive.scripts_dir,
        )
    });
    let archive = git.as_ref().map(|g| g as &dyn ScriptArchive);
    debug!(
        sinks = audit.len(),
        archive = archive.is_some(),
        action = action.as_str(),
        "running script"
    );

    let outcome = tokio::runtime::Runtime::new()?.block_on(async {
        let outcome = execute::apply_script(&registry, &request, archive, &audit).await;
        registry.close_all().await;
        outcome
    })?;

    print_outcome(args, &resolved, format, &outcome)?;

    if outcome.success {
        return Ok(());
    }
    match outcome.failure {
        Some(err) => Err(err.into()),
        None => Err(AppError::new(
            ErrorKind::Execution,
            outcome.error.unwrap_or_else(|| format!("{} failed", action.as_str())),
        )
        .into()),
    }
}

fn print_outcome(
    args: &CliArgs,
    resolved: &ResolvedConfig,
    format: OutputFormat,
    outcome: &ApplyOutcome,
) -> Result<()> {
    if args.quiet {
        return Ok(());
    }
    if matches!(format, OutputFormat::Json) {
        output::print_json(outcome, common::json_pretty(resolved))?;
    } else {
        println!("{}", plan_out::render_apply_outcome(outcome, format));
    }
    Ok(())
}
