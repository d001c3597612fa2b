//! Text rendering of plans and apply outcomes for the pretty and markdown formats.

use std::fmt::Write as _;

use crate::aggregate::CombinedPlan;
use crate::config::OutputFormat;
use crate::diff::ScriptPlan;
use crate::execute::ApplyOutcome;
use crate::model::{DiffSummary, ObjectPlan, ObjectRef};
use crate::output::table::{self, TableOptions};

fn heading(out: &mut String, title: &str, format: OutputFormat) {
    match format {
        OutputFormat::Markdown => {
            let _ = writeln!(out, "## {title}\n");
        }
        _ => {
            let _ = writeln!(out, "== {title} ==");
        }
    }
}

fn script_block(out: &mut String, label: &str, script: &str, format: OutputFormat) {
    match format {
        OutputFormat::Markdown => {
            let _ = writeln!(out, "**{label}**\n\n```sql\n{}\n```\n", script.trim_end());
        }
        _ => {
            let _ = writeln!(out, "{label}:\n{}\n", script.trim_end());
        }
    }
}

fn summary_lines(summary: &DiffSummary) -> Vec<String> {
    match summary {
        DiffSummary::Table {
            added,
            removed,
            altered,
        } => {
            let mut lines = Vec::new();
            if !added.is_empty() {
                lines.push(format!("added: {}", added.join(", ")));
            }
            if !removed.is_empty() {
                lines.push(format!("removed: {}", removed.join(", ")));
            }
            for change in altered {
                lines.push(format!(
                    "altered: {} {} -> {}",
                    change.column, change.from_type, change.to_type
                ));
            }
            lines
        }
        DiffSummary::Definition {
            exists_in_source,
            exists_in_target,
            changed,
            unified_diff,
        } => {
            let mut lines = vec![format!(
                "source: {}, target: {}, changed: {}",
                presence(*exists_in_source),
                presence(*exists_in_target),
                changed
            )];
            if let Some(diff) = unified_diff {
                lines.push(diff.trim_end().to_string());
            }
            lines
        }
    }
}

fn presence(exists: bool) -> &'static str {
    if exists { "present" } else { "missing" }
}

pub fn render_object_plan(plan: &ObjectPlan, format: OutputFormat) -> String {
    let mut out = String::new();
    heading(&mut out, &plan.object.to_string(), format);
    if let Some(summary) = &plan.diff_summary {
        for line in summary_lines(summary) {
            let _ = writeln!(out, "{line}");
        }
    }
    for note in &plan.notes {
        let _ = writeln!(out, "- {note}");
    }
    if plan.diff_summary.is_some() || !plan.notes.is_empty() {
        out.push('\n');
    }
    script_block(&mut out, "Implementation", &plan.implementation, format);
    script_block(&mut out, "Rollback", &plan.rollback, format);
    out
}

pub fn render_script_plan(plan: &ScriptPlan, format: OutputFormat) -> String {
    let mut out = String::new();
    for object in &plan.plans {
        out.push_str(&render_object_plan(object, format));
    }
    if !plan.notes.is_empty() {
        heading(&mut out, "Notes", format);
        for note in &plan.notes {
            let _ = writeln!(out, "- {note}");
        }
    }
    out.trim_end().to_string()
}

fn object_list(objects: &[ObjectRef]) -> String {
    objects
        .iter()
        .enumerate()
        .map(|(idx, object)| format!("{}. {object}", idx + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_combined_plan(
    plans: &[ObjectPlan],
    combined: &CombinedPlan,
    format: OutputFormat,
) -> String {
    let mut out = String::new();
    for plan in plans {
        out.push_str(&render_object_plan(plan, format));
    }

    heading(&mut out, "Apply order", format);
    let _ = writeln!(out, "{}\n", object_list(&combined.apply_order));
    if !combined.unordered.is_empty() {
        let _ = writeln!(
            out,
            "Unordered (dependency cycle):\n{}\n",
            object_list(&combined.unordered)
        );
    }
    if !combined.skipped_schemas.is_empty() {
        let _ = writeln!(
            out,
            "Schemas not created automatically: {}\n",
            combined.skipped_schemas.join(", ")
        );
    }

    heading(&mut out, "Combined", format);
    let implementation = if combined.combined_implementation.is_empty() {
        crate::model::NO_CHANGES
    } else {
        &combined.combined_implementation
    };
    let rollback = if combined.combined_rollback.is_empty() {
        crate::model::NO_ROLLBACK
    } else {
        &combined.combined_rollback
    };
    script_block(&mut out, "Implementation", implementation, format);
    script_block(&mut out, "Rollback", rollback, format);
    out.trim_end().to_string()
}

pub fn render_apply_outcome(outcome: &ApplyOutcome, format: OutputFormat) -> String {
    let status = match (outcome.success, outcome.dry_run) {
        (true, true) => "dry run ok (rolled back)",
        (true, false) => "applied",
        (false, _) => "failed",
    };
    let mut rows = vec![
        ("status".to_string(), status.to_string()),
        ("action".to_string(), outcome.action.as_str().to_string()),
        ("environment".to_string(), outcome.environment.clone()),
        ("batches".to_string(), outcome.completed_batches.to_string()),
        ("rowsAffected".to_string(), outcome.rows_affected.to_string()),
    ];
    if !outcome.created_schemas.is_empty() {
        rows.push(("createdSchemas".to_string(), outcome.created_schemas.join(", ")));
    }
    if !outcome.skipped_schemas.is_empty() {
        rows.push(("skippedSchemas".to_string(), outcome.skipped_schemas.join(", ")));
    }
    if let Some(commit) = &outcome.commit_id {
        rows.push(("commit".to_string(), commit.clone()));
    }
    if let Some(warning) = &outcome.archive_warning {
        rows.push(("archiveWarning".to_string(), warning.clone()));
    }
    if let Some(error) = &outcome.error {
        rows.push(("error".to_string(), error.clone()));
    }

    let options = TableOptions::default();
    let mut rendered = table::render_key_value_table("Apply", &rows, format, &options);
    if let Some(last) = outcome.report.as_ref().and_then(|r| r.last_result.as_ref()) {
        rendered.push_str("\n\n");
        rendered.push_str(&table::render_result_set_table(last, format, &options));
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlteredColumn;
    use crate::model::ColumnSignature;
    use crate::order::Ordering;

    fn table_plan() -> ObjectPlan {
        let mut plan = ObjectPlan::new(ObjectRef::table("dbo", "Orders"));
        plan.implementation = "ALTER TABLE [dbo].[Orders] ADD [Note] nvarchar(50) NULL;".to_string();
        plan.rollback = "ALTER TABLE [dbo].[Orders] DROP COLUMN [Note];".to_string();
        plan.note("Column Note added");
        plan.diff_summary = Some(DiffSummary::Table {
            added: vec!["Note".to_string()],
            removed: Vec::new(),
            altered: Vec::new(),
        });
        plan
    }

    #[test]
    fn object_plan_lists_summary_notes_and_scripts() {
        let text = render_object_plan(&table_plan(), OutputFormat::Pretty);
        assert!(text.starts_with("== TABLE dbo.Orders =="));
        assert!(text.contains("added: Note"));
        assert!(text.contains("- Column Note added"));
        assert!(text.contains("Implementation:\nALTER TABLE [dbo].[Orders] ADD"));
        assert!(text.contains("Rollback:\nALTER TABLE [dbo].[Orders] DROP COLUMN"));
    }

    #[test]
    fn markdown_wraps_scripts_in_sql_fences() {
        let text = render_object_plan(&table_plan(), OutputFormat::Markdown);
        assert!(text.starts_with("## TABLE dbo.Orders"));
        assert!(text.contains("```sql\nALTER TABLE"));
    }

    #[test]
    fn altered_columns_show_both_types() {
        let signature = ColumnSignature {
            sql_type: "int".to_string(),
            max_length: 0,
            precision: 0,
            scale: 0,
            is_nullable: false,
            is_computed: false,
        };
        let summary = DiffSummary::Table {
            added: Vec::new(),
            removed: Vec::new(),
            altered: vec![AlteredColumn {
                column: "Qty".to_string(),
                from_type: "int".to_string(),
                to_type: "bigint".to_string(),
                from_signature: signature.clone(),
                to_signature: signature,
            }],
        };
        assert_eq!(summary_lines(&summary), vec!["altered: Qty int -> bigint"]);
    }

    #[test]
    fn empty_combined_scripts_render_markers() {
        let ordering = Ordering::sequential(vec![ObjectRef::table("dbo", "Orders")]);
        let combined = CombinedPlan {
            apply_order: ordering.order.clone(),
            ..CombinedPlan::default()
        };
        let text = render_combined_plan(&[], &combined, OutputFormat::Pretty);
        assert!(text.contains("1. TABLE dbo.Orders"));
        assert!(text.contains(crate::model::NO_CHANGES));
        assert!(text.contains(crate::model::NO_ROLLBACK));
    }
}
