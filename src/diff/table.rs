use std::collections::{HashMap, HashSet};

use crate::introspect::{TableExtras, TableSnapshot, create_table_script};
use crate::model::{
    ColumnChange, ColumnMetadata, DiffSummary, NO_CHANGES, NO_ROLLBACK, ObjectPlan, ObjectRef,
    TableDiff, qualified_name, quote_ident,
};

pub const SOURCE_TABLE_MISSING: &str =
    "-- Source table not found in source environment; no implementation generated";

fn by_name(columns: &[ColumnMetadata]) -> HashMap<String, &ColumnMetadata> {
    columns.iter().map(|c| (c.name.to_lowercase(), c)).collect()
}

/// Computed expressions compare without whitespace, brackets or parentheses,
/// since the catalog stores them re-formatted.
fn normalize_expression(expr: &str) -> String {
    expr.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '[' | ']' | '(' | ')'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn columns_differ(desired: &ColumnMetadata, actual: &ColumnMetadata) -> bool {
    if desired.is_computed && actual.is_computed {
        let lhs = normalize_expression(desired.computed_definition.as_deref().unwrap_or(""));
        let rhs = normalize_expression(actual.computed_definition.as_deref().unwrap_or(""));
        return lhs != rhs;
    }
    desired.signature() != actual.signature()
}

/// Column names match case-insensitively. Added columns keep the desired
/// order, removed columns keep the actual order.
pub fn diff_table(desired: &[ColumnMetadata], actual: &[ColumnMetadata]) -> TableDiff {
    let desired_map = by_name(desired);
    let actual_map = by_name(actual);
    let mut diff = TableDiff::default();

    for col in desired {
        match actual_map.get(&col.name.to_lowercase()) {
            None => diff.added.push(col.clone()),
            Some(existing) if columns_differ(col, existing) => diff.altered.push(ColumnChange {
                desired: col.clone(),
                actual: (*existing).clone(),
            }),
            Some(_) => {}
        }
    }
    for col in actual {
        if !desired_map.contains_key(&col.name.to_lowercase()) {
            diff.removed.push(col.clone());
        }
    }
    diff
}

/// Forward statements in execution order, with a rollback that undoes the
/// last forward statement first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub forward: Vec<String>,
    pub rollback: Vec<String>,
    pub notes: Vec<String>,
}

impl ChangeSet {
    pub fn push(&mut self, forward: String, inverse: String) {
        self.forward.push(forward);
        self.rollback.insert(0, inverse);
    }

    /// Forward statement whose inverse cannot be generated.
    pub fn push_forward_only(&mut self, forward: String) {
        self.forward.push(forward);
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn implementation(&self) -> String {
        if self.forward.is_empty() {
            NO_CHANGES.to_string()
        } else {
            self.forward.join("\n")
        }
    }

    pub fn rollback_script(&self) -> String {
        if self.rollback.is_empty() {
            NO_ROLLBACK.to_string()
        } else {
            self.rollback.join("\n")
        }
    }

    pub fn extend(&mut self, other: ChangeSet) {
        self.forward.extend(other.forward);
        let mut rollback = other.rollback;
        rollback.append(&mut self.rollback);
        self.rollback = rollback;
        self.notes.extend(other.notes);
    }
}

/// Column re-add used by rollbacks of dropped columns.
pub(crate) fn readd_column(target: &str, col: &ColumnMetadata) -> String {
    format!(
        "ALTER TABLE {target} ADD {} {}",
        quote_ident(&col.name),
        col.definition_with_default(false)
    )
}

pub(crate) fn drop_column(target: &str, name: &str) -> String {
    format!("ALTER TABLE {target} DROP COLUMN {}", quote_ident(name))
}

/// One object that has to go before a column can be dropped.
struct Dependent {
    drop: String,
    create: String,
    note: String,
}

/// Indexes, check constraints and the primary key in `extras` that refer to
/// `col`. Objects already listed in `already_dropped` are skipped.
fn dependents_of(
    target: &str,
    col: &ColumnMetadata,
    extras: &TableExtras,
    already_dropped: &mut HashSet<String>,
) -> Vec<Dependent> {
    let mut found = Vec::new();
    for index in extras.indexes.iter().filter(|idx| idx.references(&col.name)) {
        if already_dropped.insert(format!("index::{}", index.name.to_lowercase())) {
            found.push(Dependent {
                drop: index.drop_sql(target),
                create: index.create_sql(target),
                note: format!("Index {} references {}", index.name, col.name),
            });
        }
    }
    for check in extras.check_constraints.iter().filter(|c| c.references(&col.name)) {
        if already_dropped.insert(format!("check::{}", check.name.to_lowercase())) {
            found.push(Dependent {
                drop: check.drop_sql(target),
                create: check.create_sql(target),
                note: format!("Check constraint {} references {}", check.name, col.name),
            });
        }
    }
    if let Some(pk) = extras.primary_key.as_ref().filter(|pk| pk.references(&col.name)) {
        if already_dropped.insert("primary_key".to_string()) {
            found.push(Dependent {
                drop: pk.drop_sql(target),
                create: pk.create_sql(target),
                note: format!("Primary key {} references {}", pk.name, col.name),
            });
        }
    }
    found
}

/// Drops whatever in `extras` depends on `col` ahead of dropping it, and
/// restores those objects after the column is re-added on rollback.
pub(crate) fn drop_with_dependents(
    changes: &mut ChangeSet,
    target: &str,
    col: &ColumnMetadata,
    extras: &TableExtras,
    already_dropped: &mut HashSet<String>,
) {
    match extras.default_for(&col.name) {
        Some(default) => {
            changes.push(default.drop_sql(target), default.create_sql(target));
            changes.note(format!(
                "Default constraint {} on {} is dropped first and restored on rollback",
                default.name, col.name
            ));
        }
        None if col.default_definition.is_some() => {
            changes.note(format!(
                "Default on {} is not restored by rollback",
                col.name
            ));
        }
        None => {}
    }

    for dependent in dependents_of(target, col, extras, already_dropped) {
        changes.push(dependent.drop, dependent.create);
        changes.note(format!("{} and is recreated on rollback", dependent.note));
    }

    changes.push(drop_column(target, &col.name), readd_column(target, col));
    changes.note(format!("Column {} will be DROPPED", col.name));
}

/// Computed columns cannot be altered in place: drop the old expression with
/// its dependents, add the new one, then put the dependents back.
fn replace_computed_column(
    changes: &mut ChangeSet,
    target: &str,
    actual: &ColumnMetadata,
    desired: &ColumnMetadata,
    extras: &TableExtras,
    already_dropped: &mut HashSet<String>,
) {
    let dependents = dependents_of(target, actual, extras, already_dropped);
    for dependent in &dependents {
        changes.push(dependent.drop.clone(), dependent.create.clone());
    }
    changes.push(drop_column(target, &actual.name), readd_column(target, actual));
    changes.push(readd_column(target, desired), drop_column(target, &desired.name));
    for dependent in dependents.into_iter().rev() {
        changes.push(dependent.create, dependent.drop);
        changes.note(format!("{} and is rebuilt on the new expression", dependent.note));
    }
}

fn alter_column(target: &str, col: &ColumnMetadata) -> String {
    format!(
        "ALTER TABLE {target} ALTER COLUMN {} {}",
        quote_ident(&col.name),
        col.type_description()
    )
}

/// Emits forward and inverse statements for every difference in `diff`.
/// `extras` describes the actual table and is consulted for drops.
pub fn plan_table_changes(
    schema: &str,
    table: &str,
    diff: &TableDiff,
    extras: &TableExtras,
) -> ChangeSet {
    let target = qualified_name(schema, table);
    let mut changes = ChangeSet::default();

    for col in &diff.added {
        changes.push(
            format!(
                "ALTER TABLE {target} ADD {} {}",
                quote_ident(&col.name),
                col.definition()
            ),
            drop_column(&target, &col.name),
        );
        changes.note(format!("Column {} will be ADDED", col.name));
    }

    let mut dropped = HashSet::new();
    for col in &diff.removed {
        drop_with_dependents(&mut changes, &target, col, extras, &mut dropped);
    }

    for change in &diff.altered {
        let summary = change.summary();
        if change.desired.is_computed || change.actual.is_computed {
            replace_computed_column(
                &mut changes,
                &target,
                &change.actual,
                &change.desired,
                extras,
                &mut dropped,
            );
            changes.note(format!(
                "Column {} is computed; it is dropped and re-added: {} -> {}",
                summary.column, summary.from_type, summary.to_type
            ));
            continue;
        }
        changes.push(
            alter_column(&target, &change.desired),
            alter_column(&target, &change.actual),
        );
        changes.note(format!(
            "Column {} will be ALTERED: {} -> {}",
            summary.column, summary.from_type, summary.to_type
        ));
    }

    changes
}

/// Plans one table from a source snapshot against a target snapshot.
pub fn plan_table(
    object: ObjectRef,
    source: Option<&TableSnapshot>,
    target: &TableSnapshot,
) -> ObjectPlan {
    let schema = object.schema.clone();
    let table = object.name.clone();
    let mut plan = ObjectPlan::new(object);
    let source = source.filter(|s| s.exists());

    let Some(source) = source else {
        if target.exists() {
            plan.implementation = format!(
                "-- Source does not contain TABLE {}",
                qualified_name(&schema, &table)
            );
            plan.rollback = NO_ROLLBACK.to_string();
            plan.note("Table exists only in the target; nothing generated");
        } else {
            plan.implementation = SOURCE_TABLE_MISSING.to_string();
            plan.rollback = NO_ROLLBACK.to_string();
            plan.note("Source table not found; skipping");
        }
        return plan;
    };

    if !target.exists() {
        plan.implementation = create_table_script(&schema, &table, &source.columns, &source.extras);
        plan.rollback = format!("DROP TABLE {}", qualified_name(&schema, &table));
        plan.note("Table does not exist in target; create and drop generated");
        plan.diff_summary = Some(DiffSummary::from_table_diff(&TableDiff {
            added: source.columns.clone(),
            ..TableDiff::default()
        }));
        return plan;
    }

    let diff = diff_table(&source.columns, &target.columns);
    let changes = plan_table_changes(&schema, &table, &diff, &target.extras);
    plan.implementation = changes.implementation();
    plan.rollback = changes.rollback_script();
    plan.notes = changes.notes;
    if diff.is_empty() {
        plan.note("No differences detected");
    }
    plan.diff_summary = Some(DiffSummary::from_table_diff(&diff));
    plan
}
