use anyhow::Result;
use serde_json::json;

use crate::cli::{CliArgs, HistoryArgs};
use crate::commands::common;
use crate::config::OutputFormat;
use crate::error::{AppError, ErrorKind};
use crate::model::ObjectRef;
use crate::output::{self, TableOptions, table};
use crate::sinks::{CommitDetails, CommitSummary, GitArchive};

const LIMIT_DEFAULT: usize = 20;
const LIMIT_MAX: usize = 500;

pub fn run(args: &CliArgs, cmd: &HistoryArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);
    let limit = common::parse_limit(cmd.limit, LIMIT_DEFAULT, LIMIT_MAX);
    let archive = GitArchive::new(
        &resolved.settings.archive.repo_dir,
        &resolved.settings.archive.scripts_dir,
    );

    if let Some(hash) = &cmd.commit {
        let details = tokio::runtime::Runtime::new()?.block_on(archive.commit_details(hash))?;
        return print_details(args, &resolved, format, &details);
    }

    let object = cmd
        .object
        .as_deref()
        .map(ObjectRef::parse_spec)
        .transpose()
        .map_err(|message| AppError::new(ErrorKind::Config, message))?;
    let commits = tokio::runtime::Runtime::new()?.block_on(async {
        match &object {
            Some(object) => archive.object_history(&object.schema, &object.name, limit).await,
            None => archive.history(limit).await,
        }
    })?;

    if args.quiet {
        return Ok(());
    }

    if matches!(format, OutputFormat::Json) {
        let payload = json!({
            "object": object.as_ref().map(|o| format!("{}.{}", o.schema, o.name)),
            "count": commits.len(),
            "commits": commits,
        });
        output::print_json(&payload, common::json_pretty(&resolved))?;
        return Ok(());
    }

    if commits.is_empty() {
        println!("No archived scripts yet.");
        return Ok(());
    }
    println!(
        "{}",
        table::render_rows(
            &["Commit", "Date", "Action", "Environment", "User"],
            &commit_rows(&commits),
            format,
            &TableOptions::default()
        )
    );
    Ok(())
}

fn commit_rows(commits: &[CommitSummary]) -> Vec<Vec<String>> {
    commits
        .iter()
        .map(|commit| {
            vec![
                commit.short_hash.clone(),
                commit.date.clone(),
                commit.action.clone().unwrap_or_default(),
                commit.environment.clone().unwrap_or_default(),
                commit.user.clone().unwrap_or_else(|| commit.author.clone()),
            ]
        })
        .collect()
}

fn print_details(
    args: &CliArgs,
    resolved: &crate::config::ResolvedConfig,
    format: OutputFormat,
    details: &CommitDetails,
) -> Result<()> {
    if args.quiet {
        return Ok(());
    }
    if matches!(format, OutputFormat::Json) {
        output::print_json(details, common::json_pretty(resolved))?;
        return Ok(());
    }

    let mut rows = vec![
        ("commit".to_string(), details.commit.hash.clone()),
        ("date".to_string(), details.commit.date.clone()),
        ("author".to_string(), details.commit.author.clone()),
    ];
    rows.extend(details.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
    rows.push(("files".to_string(), details.files.join(", ")));
    println!(
        "{}",
        table::render_key_value_table("Commit", &rows, format, &TableOptions::default())
    );
    println!();
    println!("{}", details.diff.trim_end());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_rows_fall_back_to_the_author() {
        let commit = CommitSummary {
            hash: "abcdef1234".to_string(),
            short_hash: "abcdef1".to_string(),
            date: "2024-05-01 10:00:00 +0000".to_string(),
            author: "ddlplan".to_string(),
            email: "ddlplan@localhost".to_string(),
            message: "APPLY: DEV - alice".to_string(),
            environment: Some("DEV".to_string()),
            user: None,
            action: Some("APPLY".to_string()),
        };
        let rows = commit_rows(&[commit]);
        assert_eq!(rows[0], vec!["abcdef1", "2024-05-01 10:00:00 +0000", "APPLY", "DEV", "ddlplan"]);
    }
}
