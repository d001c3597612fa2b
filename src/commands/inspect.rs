use anyhow::Result;
use serde_json::json;

use crate::cli::{CliArgs, InspectArgs};
use crate::commands::common;
use crate::config::OutputFormat;
use crate::ddl::{self, AlterKind, Parsed, Statement};
use crate::execute::extract_schema_names;
use crate::model::qualified_name;
use crate::output::{self, TableOptions, table};

const PREVIEW_CHARS: usize = 60;

fn describe_statement(parsed: &Parsed) -> (String, String) {
    match parsed {
        Parsed::Recognized(Statement::CreateTable(create)) => (
            "CREATE TABLE".to_string(),
            qualified_name(&create.schema, &create.table),
        ),
        Parsed::Recognized(Statement::AlterTable(alter)) => (
            format!("ALTER TABLE {}", alter_label(alter.kind)),
            qualified_name(&alter.schema, &alter.table),
        ),
        Parsed::Unrecognized(text) => ("not planned".to_string(), preview(text)),
    }
}

fn alter_label(kind: AlterKind) -> &'static str {
    match kind {
        AlterKind::Add => "ADD",
        AlterKind::Drop => "DROP COLUMN",
        AlterKind::Alter => "ALTER COLUMN",
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PREVIEW_CHARS {
        format!("{}...", flat.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        flat
    }
}

/// Offline view of a script: its batches, the statements the planner
/// recognizes and the schemas it references. No connection is opened.
pub fn run(args: &CliArgs, cmd: &InspectArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);
    let script = common::read_script(&cmd.file, &resolved)?;

    let batches = ddl::split_batches(&script);
    let statements = ddl::parse_script(&script);
    let schemas = extract_schema_names(&script);

    if args.quiet {
        return Ok(());
    }

    if matches!(format, OutputFormat::Json) {
        let payload = json!({
            "file": cmd.file.display().to_string(),
            "batchCount": batches.len(),
            "batches": batches,
            "statements": statements,
            "schemas": schemas,
        });
        output::print_json(&payload, common::json_pretty(&resolved))?;
        return Ok(());
    }

    let rows: Vec<Vec<String>> = statements
        .iter()
        .enumerate()
        .map(|(idx, parsed)| {
            let (kind, target) = describe_statement(parsed);
            vec![(idx + 1).to_string(), kind, target]
        })
        .collect();
    println!("Batches: {}", batches.len());
    if !schemas.is_empty() {
        println!("Schemas: {}", schemas.join(", "));
    }
    println!(
        "{}",
        table::render_rows(&["#", "Statement", "Target"], &rows, format, &TableOptions::default())
    );
    Ok(())
}
