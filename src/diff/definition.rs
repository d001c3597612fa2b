use similar::TextDiff;

use crate::introspect::TableExtras;
use crate::model::{
    DiffSummary, NO_DEFINITION_CHANGES, NO_DEFINITION_ROLLBACK, ObjectPlan, ObjectRef,
    quote_ident,
};

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Plans a view, procedure, function or trigger by comparing module text.
pub fn plan_definition(
    object: ObjectRef,
    source: Option<&str>,
    target: Option<&str>,
) -> ObjectPlan {
    let kind = object.object_type.as_str();
    let target_name = object.qualified();
    let mut plan = ObjectPlan::new(object);
    plan.implementation = NO_DEFINITION_CHANGES.to_string();
    plan.rollback = NO_DEFINITION_ROLLBACK.to_string();

    let changed = matches!((source, target), (Some(s), Some(t)) if s.trim() != t.trim());
    match (source, target) {
        (Some(src), None) => {
            plan.implementation = src.to_string();
            plan.rollback = format!("DROP {kind} {target_name}");
            plan.note(format!("{kind} does not exist in target; create and drop generated"));
        }
        (Some(src), Some(tgt)) if changed => {
            plan.implementation = format!("-- Replace {kind}\nDROP {kind} {target_name}\nGO\n{src}");
            plan.rollback = format!(
                "-- Restore target definition\nDROP {kind} {target_name}\nGO\n{tgt}"
            );
            plan.note(format!("{kind} definition differs; drop and recreate generated"));
        }
        (Some(_), Some(_)) => plan.note("Definitions match"),
        (None, _) => {
            plan.implementation = format!("-- Source does not contain {kind} {target_name}");
            plan.note(format!("{kind} not found in source"));
        }
    }

    let unified_diff = match (source, target) {
        (Some(src), Some(tgt)) if changed => {
            let (src, tgt) = (normalize_newlines(src), normalize_newlines(tgt));
            Some(
                TextDiff::from_lines(&tgt, &src)
                    .unified_diff()
                    .context_radius(3)
                    .header("target", "source")
                    .to_string(),
            )
        }
        _ => None,
    };
    plan.diff_summary = Some(DiffSummary::Definition {
        exists_in_source: source.is_some(),
        exists_in_target: target.is_some(),
        changed,
        unified_diff,
    });
    plan
}

/// Plans an index by comparing the create statement rendered from each side's
/// table extras. Requires the parent table on `object`.
pub fn plan_index(
    object: ObjectRef,
    source: Option<&TableExtras>,
    target: Option<&TableExtras>,
) -> ObjectPlan {
    let Some(table) = object.table.clone() else {
        let message = format!("Index {} requires its parent table", object.name);
        return ObjectPlan::failed(object, message);
    };
    let parent = format!("{}.{}", quote_ident(&object.schema), quote_ident(&table));
    let label = format!("{parent}.{}", quote_ident(&object.name));
    let source_index = source.and_then(|extras| extras.index(&object.name));
    let target_index = target.and_then(|extras| extras.index(&object.name));
    let source_sql = source_index.map(|idx| idx.create_sql(&parent));
    let target_sql = target_index.map(|idx| idx.create_sql(&parent));
    let changed = matches!((&source_sql, &target_sql), (Some(s), Some(t)) if s != t);

    let mut plan = ObjectPlan::new(object);
    plan.implementation = NO_DEFINITION_CHANGES.to_string();
    plan.rollback = NO_DEFINITION_ROLLBACK.to_string();
    match (source_index, target_index) {
        (Some(src), None) => {
            plan.implementation = src.create_sql(&parent);
            plan.rollback = src.drop_sql(&parent);
            plan.note("Index does not exist in target; create and drop generated");
        }
        (Some(src), Some(tgt)) if changed => {
            plan.implementation = format!("{}\n{}", tgt.drop_sql(&parent), src.create_sql(&parent));
            plan.rollback = format!("{}\n{}", src.drop_sql(&parent), tgt.create_sql(&parent));
            plan.note("Index definition differs; drop and recreate generated");
        }
        (Some(_), Some(_)) => plan.note("Index definitions match"),
        (None, _) => {
            plan.implementation = format!("-- Source does not contain INDEX {label}");
            plan.note("Index not found in source");
        }
    }
    plan.diff_summary = Some(DiffSummary::Definition {
        exists_in_source: source_sql.is_some(),
        exists_in_target: target_sql.is_some(),
        changed,
        unified_diff: None,
    });
    plan
}
