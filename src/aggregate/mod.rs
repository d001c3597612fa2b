//! Plan aggregator: stitches per-object scripts into one implementation
//! script and one rollback script in apply order.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::model::{ObjectPlan, ObjectRef, is_executable};
use crate::order::Ordering;

pub const BATCH_SEPARATOR: &str = "\nGO\n\n";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedPlan {
    pub combined_implementation: String,
    pub combined_rollback: String,
    pub apply_order: Vec<ObjectRef>,
    pub unordered: Vec<ObjectRef>,
    /// Schemas the implementation creates when missing.
    pub created_schemas: Vec<String>,
    /// Schemas that were not safe to interpolate and got no CREATE SCHEMA.
    pub skipped_schemas: Vec<String>,
}

fn safe_identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

pub fn is_safe_identifier(name: &str) -> bool {
    safe_identifier_re().is_match(name)
}

/// Joins executable scripts with batch separators and a trailing `GO`.
fn join_scripts<'a>(scripts: impl Iterator<Item = &'a str>) -> String {
    let parts: Vec<&str> = scripts.filter(|s| is_executable(s)).collect();
    if parts.is_empty() {
        return String::new();
    }
    let mut combined = parts.join(BATCH_SEPARATOR);
    combined.push_str("\nGO");
    combined
}

/// Plans in apply order: `ordering.order`, then `ordering.unordered`, then any
/// plan the ordering does not mention, in request order.
fn sequence<'a>(plans: &'a [ObjectPlan], ordering: &Ordering) -> Vec<&'a ObjectPlan> {
    let mut used = vec![false; plans.len()];
    let mut sequenced = Vec::with_capacity(plans.len());
    for object in ordering.iter() {
        let key = object.node_key();
        if let Some(idx) = (0..plans.len()).find(|&i| !used[i] && plans[i].object.node_key() == key) {
            used[idx] = true;
            sequenced.push(&plans[idx]);
        }
    }
    for (idx, plan) in plans.iter().enumerate() {
        if !used[idx] {
            sequenced.push(plan);
        }
    }
    sequenced
}

/// Conditional CREATE SCHEMA lines for the non-`dbo` schemas of `objects`,
/// plus the schema names that were rejected.
pub fn schema_preface<'a>(objects: impl Iterator<Item = &'a ObjectRef>) -> (Vec<String>, Vec<String>) {
    let mut safe: Vec<String> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();
    for object in objects {
        let schema = object.schema.trim();
        if schema.is_empty() || schema.eq_ignore_ascii_case("dbo") {
            continue;
        }
        let bucket = if is_safe_identifier(schema) {
            &mut safe
        } else {
            &mut skipped
        };
        if !bucket.iter().any(|s| s == schema) {
            bucket.push(schema.to_string());
        }
    }
    (safe, skipped)
}

fn create_schema_sql(schema: &str) -> String {
    format!(
        "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = N'{schema}') EXEC('CREATE SCHEMA [{schema}]');"
    )
}

pub fn combine(plans: &[ObjectPlan], ordering: &Ordering) -> CombinedPlan {
    let sequenced = sequence(plans, ordering);
    let mut combined_implementation =
        join_scripts(sequenced.iter().map(|p| p.implementation.as_str()));
    let combined_rollback = join_scripts(sequenced.iter().rev().map(|p| p.rollback.as_str()));

    let (created_schemas, skipped_schemas) = schema_preface(plans.iter().map(|p| &p.object));
    if !created_schemas.is_empty() {
        let preface = created_schemas
            .iter()
            .map(|s| create_schema_sql(s))
            .collect::<Vec<_>>()
            .join("\n");
        combined_implementation = if combined_implementation.is_empty() {
            format!("{preface}\nGO")
        } else {
            format!("{preface}{BATCH_SEPARATOR}{combined_implementation}")
        };
    }
    debug!(
        plans = plans.len(),
        schemas = created_schemas.len(),
        skipped = skipped_schemas.len(),
        "plans combined"
    );

    CombinedPlan {
        combined_implementation,
        combined_rollback,
        apply_order: ordering.order.clone(),
        unordered: ordering.unordered.clone(),
        created_schemas,
        skipped_schemas,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NO_CHANGES, NO_ROLLBACK, ObjectType, PLACEHOLDER};

    fn plan(schema: &str, name: &str, implementation: &str, rollback: &str) -> ObjectPlan {
        ObjectPlan {
            implementation: implementation.to_string(),
            rollback: rollback.to_string(),
            ..ObjectPlan::new(ObjectRef::table(schema, name))
        }
    }

    #[test]
    fn joins_in_apply_order_and_reverses_rollback() {
        let plans = vec![
            plan("dbo", "B", "CREATE B", "DROP B"),
            plan("dbo", "A", "CREATE A", "DROP A"),
        ];
        let ordering = Ordering::sequential(vec![
            ObjectRef::table("dbo", "A"),
            ObjectRef::table("dbo", "B"),
        ]);
        let combined = combine(&plans, &ordering);
        assert_eq!(combined.combined_implementation, "CREATE A\nGO\n\nCREATE B\nGO");
        assert_eq!(combined.combined_rollback, "DROP B\nGO\n\nDROP A\nGO");
    }

    #[test]
    fn placeholders_and_comment_only_scripts_are_skipped() {
        let plans = vec![
            plan("dbo", "A", NO_CHANGES, NO_ROLLBACK),
            plan("dbo", "B", PLACEHOLDER, PLACEHOLDER),
        ];
        let combined = combine(&plans, &Ordering::default());
        assert_eq!(combined.combined_implementation, "");
        assert_eq!(combined.combined_rollback, "");
    }

    #[test]
    fn unordered_plans_follow_ordered_ones() {
        let plans = vec![
            plan("dbo", "Cyclic", "CREATE C", "DROP C"),
            plan("dbo", "Base", "CREATE Base", "DROP Base"),
        ];
        let ordering = Ordering {
            order: vec![ObjectRef::table("dbo", "Base")],
            unordered: vec![ObjectRef::table("dbo", "Cyclic")],
        };
        let combined = combine(&plans, &ordering);
        assert_eq!(combined.combined_implementation, "CREATE Base\nGO\n\nCREATE C\nGO");
        assert_eq!(combined.unordered.len(), 1);
    }

    #[test]
    fn safe_schemas_get_a_preface_and_unsafe_ones_are_reported() {
        let plans = vec![
            plan("sales", "Orders", "CREATE O", "DROP O"),
            plan("bad-name", "X", "CREATE X", "DROP X"),
            plan("dbo", "Y", "CREATE Y", "DROP Y"),
            ObjectPlan {
                implementation: "CREATE V".to_string(),
                ..ObjectPlan::new(ObjectRef::new(ObjectType::View, "sales", "v"))
            },
        ];
        let combined = combine(&plans, &Ordering::default());
        assert_eq!(combined.created_schemas, vec!["sales"]);
        assert_eq!(combined.skipped_schemas, vec!["bad-name"]);
        assert!(combined.combined_implementation.starts_with(
            "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = N'sales') EXEC('CREATE SCHEMA [sales]');\nGO\n\nCREATE O"
        ));
    }

    #[test]
    fn preface_alone_still_ends_with_go() {
        let plans = vec![plan("ops", "T", NO_CHANGES, NO_ROLLBACK)];
        let combined = combine(&plans, &Ordering::default());
        assert_eq!(
            combined.combined_implementation,
            "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = N'ops') EXEC('CREATE SCHEMA [ops]');\nGO"
        );
    }

    #[test]
    fn safe_identifier_rules() {
        assert!(is_safe_identifier("_stage1"));
        assert!(!is_safe_identifier("1stage"));
        assert!(!is_safe_identifier("a]b"));
        assert!(!is_safe_identifier(""));
    }
}
