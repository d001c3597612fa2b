use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use super::acquire;
use super::table::{ChangeSet, diff_table, drop_column, drop_with_dependents, plan_table_changes};
use crate::db::{ConnectionProvider, SqlSession, require_environment};
use crate::ddl::{
    AlterKind, AlterTable, ColumnClause, CreateTable, Parsed, Statement, parse_column_clause,
    parse_drop_names, parse_script, split_columns, unquote_ident,
};
use crate::error::EngineError;
use crate::introspect::{self, TableSnapshot};
use crate::model::{
    DiffSummary, NO_ROLLBACK, ObjectPlan, ObjectRef, TableDiff, qualified_name, quote_ident,
};

/// Plans for every recognized statement of a script, plus what was passed over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptPlan {
    pub plans: Vec<ObjectPlan>,
    /// Statements outside the recognized shapes, in script order.
    pub skipped: Vec<String>,
    pub notes: Vec<String>,
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() > 80 {
        format!("{}...", line.chars().take(80).collect::<String>())
    } else {
        line.to_string()
    }
}

/// Leading identifier of a clause that could not be parsed.
fn leading_name(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let end = if raw.starts_with('[') {
        raw.find(']').map(|p| p + 1)?
    } else {
        raw.find(char::is_whitespace).unwrap_or(raw.len())
    };
    let name = unquote_ident(&raw[..end]);
    (!name.is_empty()).then_some(name)
}

/// Plans a `CREATE TABLE` against the live table: the statement as written
/// when the table is missing, column changes otherwise.
pub fn plan_create_table(create: &CreateTable, actual: &TableSnapshot) -> ObjectPlan {
    let target = qualified_name(&create.schema, &create.table);
    let mut plan = ObjectPlan::new(ObjectRef::table(&create.schema, &create.table));

    let mut desired = Vec::new();
    let mut written = Vec::new();
    let mut protected = HashSet::new();
    for raw in &create.columns {
        match parse_column_clause(raw) {
            ColumnClause::Column(column) => {
                written.push((column.name.to_lowercase(), column.definition.clone()));
                desired.push(column.metadata);
            }
            ColumnClause::TableConstraint(text) => {
                plan.note(format!("Table constraint not compared: {}", preview(&text)));
            }
            ColumnClause::Unparsed(text) => {
                plan.note(format!("Could not parse provided column definition: {text}"));
                if let Some(name) = leading_name(&text) {
                    protected.insert(name.to_lowercase());
                }
            }
        }
    }

    if !actual.exists() {
        plan.implementation = create.raw.clone();
        plan.rollback = format!("DROP TABLE {target}");
        plan.note("Table does not exist; create and drop generated");
        plan.diff_summary = Some(DiffSummary::from_table_diff(&TableDiff {
            added: desired,
            ..TableDiff::default()
        }));
        return plan;
    }

    let mut diff = diff_table(&desired, &actual.columns);
    diff.removed.retain(|col| {
        let keep = !protected.contains(&col.name.to_lowercase());
        if !keep {
            plan.notes.push(format!(
                "Column {} kept: its provided definition could not be parsed",
                col.name
            ));
        }
        keep
    });

    let mut changes = ChangeSet::default();
    for col in &diff.added {
        let definition = written
            .iter()
            .find(|(name, _)| *name == col.name.to_lowercase())
            .map(|(_, def)| def.clone())
            .unwrap_or_else(|| col.definition());
        changes.push(
            format!("ALTER TABLE {target} ADD {} {definition}", quote_ident(&col.name)),
            drop_column(&target, &col.name),
        );
        changes.note(format!("Column {} will be ADDED", col.name));
    }
    let rest = TableDiff {
        added: Vec::new(),
        removed: diff.removed.clone(),
        altered: diff.altered.clone(),
    };
    changes.extend(plan_table_changes(&create.schema, &create.table, &rest, &actual.extras));

    plan.implementation = changes.implementation();
    plan.rollback = changes.rollback_script();
    plan.notes.extend(changes.notes);
    if diff.is_empty() {
        plan.note("No differences detected");
    }
    plan.diff_summary = Some(DiffSummary::from_table_diff(&diff));
    plan
}

/// Plans one `ALTER TABLE` statement, taking rollback types from the live table.
pub fn plan_alter_table(alter: &AlterTable, actual: &TableSnapshot) -> ObjectPlan {
    let target = qualified_name(&alter.schema, &alter.table);
    let mut plan = ObjectPlan::new(ObjectRef::table(&alter.schema, &alter.table));
    let mut changes = ChangeSet::default();
    let live = |name: &str| {
        actual
            .columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    };

    match alter.kind {
        AlterKind::Add => {
            for raw in split_columns(&alter.clause) {
                match parse_column_clause(&raw) {
                    ColumnClause::Column(column) => {
                        if live(&column.name).is_some() {
                            changes.note(format!("Column {} already exists in target", column.name));
                        }
                        changes.push(
                            format!(
                                "ALTER TABLE {target} ADD {} {}",
                                quote_ident(&column.name),
                                column.definition
                            ),
                            drop_column(&target, &column.name),
                        );
                        changes.note(format!("Column {} will be ADDED", column.name));
                    }
                    ColumnClause::TableConstraint(text) | ColumnClause::Unparsed(text) => {
                        changes.push_forward_only(format!("ALTER TABLE {target} ADD {text}"));
                        changes.note(format!("Could not parse ADD column definition: {text}"));
                    }
                }
            }
        }
        AlterKind::Drop => {
            let mut dropped = HashSet::new();
            for name in parse_drop_names(&alter.clause) {
                match live(&name) {
                    Some(col) => {
                        drop_with_dependents(&mut changes, &target, col, &actual.extras, &mut dropped)
                    }
                    None => {
                        changes.push_forward_only(drop_column(&target, &name));
                        changes.note(format!(
                            "Column {name} will be DROPPED (no type info available for rollback)"
                        ));
                    }
                }
            }
        }
        AlterKind::Alter => match parse_column_clause(&alter.clause) {
            ColumnClause::Column(column) => {
                let forward = format!(
                    "ALTER TABLE {target} ALTER COLUMN {} {}",
                    quote_ident(&column.name),
                    column.definition
                );
                match live(&column.name) {
                    Some(col) => {
                        changes.push(
                            forward,
                            format!(
                                "ALTER TABLE {target} ALTER COLUMN {} {}",
                                quote_ident(&col.name),
                                col.type_description()
                            ),
                        );
                        changes.note(format!(
                            "Column {} will be ALTERED: {} -> {}",
                            column.name,
                            col.type_description(),
                            column.metadata.type_description()
                        ));
                    }
                    None => {
                        changes.push_forward_only(forward);
                        changes.note(format!(
                            "Column {} will be ALTERED (no original type available for rollback)",
                            column.name
                        ));
                    }
                }
            }
            ColumnClause::TableConstraint(text) | ColumnClause::Unparsed(text) => {
                changes.push_forward_only(format!("ALTER TABLE {target} ALTER COLUMN {text}"));
                changes.note(format!("Could not parse ALTER COLUMN: {text}"));
            }
        },
    }

    plan.implementation = changes.implementation();
    plan.rollback = if changes.rollback.is_empty() {
        NO_ROLLBACK.to_string()
    } else {
        changes.rollback_script()
    };
    plan.notes = changes.notes;
    plan
}

async fn plan_statement<S: SqlSession + ?Sized>(
    session: &mut S,
    statement: &Statement,
) -> ObjectPlan {
    let (schema, table) = match statement {
        Statement::CreateTable(create) => (&create.schema, &create.table),
        Statement::AlterTable(alter) => (&alter.schema, &alter.table),
    };
    let snapshot = match introspect::snapshot(session, schema, table).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(schema = %schema, table = %table, error = %err, "table introspection failed");
            return ObjectPlan::failed(ObjectRef::table(schema, table), err.to_string());
        }
    };
    match statement {
        Statement::CreateTable(create) => plan_create_table(create, &snapshot),
        Statement::AlterTable(alter) => plan_alter_table(alter, &snapshot),
    }
}

/// Plans a DDL script against one environment. Unrecognized statements are
/// listed in `skipped` and never abort planning.
pub async fn plan_script<P: ConnectionProvider + ?Sized>(
    provider: &P,
    environment: &str,
    script: &str,
) -> Result<ScriptPlan, EngineError> {
    require_environment(provider, environment)?;

    let mut result = ScriptPlan::default();
    let mut statements = Vec::new();
    for parsed in parse_script(script) {
        match parsed {
            Parsed::Recognized(statement) => statements.push(statement),
            Parsed::Unrecognized(text) => {
                result
                    .notes
                    .push(format!("Statement not planned: {}", preview(&text)));
                result.skipped.push(text);
            }
        }
    }
    if statements.is_empty() {
        result
            .notes
            .push("No CREATE or ALTER TABLE statements found".to_string());
        return Ok(result);
    }

    let mut session = acquire(provider, environment).await?;
    for statement in &statements {
        result.plans.push(plan_statement(&mut session, statement).await);
    }
    provider.release(session).await;
    debug!(
        environment,
        plans = result.plans.len(),
        skipped = result.skipped.len(),
        "script planned"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::{FakeProvider, FakeSession};
    use crate::db::{ResultSet, Value};
    use crate::ddl::parse_create_tables;
    use crate::model::{ColumnMetadata, NO_CHANGES};

    fn live_table() -> TableSnapshot {
        TableSnapshot {
            columns: vec![
                ColumnMetadata {
                    is_nullable: false,
                    max_length: 4,
                    ..ColumnMetadata::new("Id", "int")
                },
                ColumnMetadata {
                    max_length: 100,
                    ..ColumnMetadata::new("Name", "nvarchar")
                },
            ],
            ..TableSnapshot::default()
        }
    }

    fn create(sql: &str) -> CreateTable {
        parse_create_tables(sql).remove(0)
    }

    #[test]
    fn create_for_missing_table_uses_text_as_written() {
        let stmt = create("CREATE TABLE dbo.T (Id int NOT NULL)");
        let plan = plan_create_table(&stmt, &TableSnapshot::default());
        assert_eq!(plan.implementation, "CREATE TABLE dbo.T (Id int NOT NULL)");
        assert_eq!(plan.rollback, "DROP TABLE [dbo].[T]");
    }

    #[test]
    fn matching_create_is_a_no_op() {
        let stmt = create("CREATE TABLE dbo.T (Id int NOT NULL, Name nvarchar(50) NULL)");
        let plan = plan_create_table(&stmt, &live_table());
        assert_eq!(plan.implementation, NO_CHANGES);
    }

    #[test]
    fn create_adds_with_written_definition_and_drops_missing() {
        let stmt = create(
            "CREATE TABLE dbo.T (Id int NOT NULL, Email varchar(200) NULL CHECK (Email LIKE '%@%'))",
        );
        let plan = plan_create_table(&stmt, &live_table());
        assert_eq!(
            plan.implementation,
            "ALTER TABLE [dbo].[T] ADD [Email] varchar(200) NULL CHECK (Email LIKE '%@%')\n\
             ALTER TABLE [dbo].[T] DROP COLUMN [Name]"
        );
        assert_eq!(
            plan.rollback,
            "ALTER TABLE [dbo].[T] ADD [Name] nvarchar(50) NULL\n\
             ALTER TABLE [dbo].[T] DROP COLUMN [Email]"
        );
    }

    #[test]
    fn unparseable_column_is_noted_and_protected_from_drop() {
        let stmt = create("CREATE TABLE dbo.T (Id int NOT NULL, Name)");
        let plan = plan_create_table(&stmt, &live_table());
        assert!(plan.notes.iter().any(|n| n.starts_with("Could not parse")));
        assert!(!plan.implementation.contains("DROP COLUMN [Name]"));
    }

    #[test]
    fn alter_column_rollback_uses_live_type() {
        let stmt = crate::ddl::parse_alter_statements(
            "ALTER TABLE dbo.T ALTER COLUMN Name nvarchar(200) NOT NULL;",
        )
        .remove(0);
        let plan = plan_alter_table(&stmt, &live_table());
        assert_eq!(
            plan.implementation,
            "ALTER TABLE [dbo].[T] ALTER COLUMN [Name] nvarchar(200) NOT NULL"
        );
        assert_eq!(plan.rollback, "ALTER TABLE [dbo].[T] ALTER COLUMN [Name] nvarchar(50) NULL");
    }

    #[test]
    fn drop_of_unknown_column_has_no_rollback() {
        let stmt = crate::ddl::parse_alter_statements("ALTER TABLE dbo.T DROP COLUMN Ghost")
            .remove(0);
        let plan = plan_alter_table(&stmt, &live_table());
        assert_eq!(plan.implementation, "ALTER TABLE [dbo].[T] DROP COLUMN [Ghost]");
        assert_eq!(plan.rollback, NO_ROLLBACK);
        assert!(plan.notes[0].contains("no type info"));
    }

    fn column_set() -> ResultSet {
        ResultSet::new(
            &["column_name", "type_name", "max_length", "is_nullable"],
            vec![vec![
                Value::Text("Id".into()),
                Value::Text("int".into()),
                Value::Int(4),
                Value::Bool(false),
            ]],
        )
    }

    #[tokio::test]
    async fn script_planning_reports_skipped_statements() {
        let provider = FakeProvider::default().with(
            "DEV",
            FakeSession::new().respond("sys.computed_columns", vec![column_set()]),
        );
        let script = "CREATE INDEX IX ON dbo.T (Id);\nGO\nALTER TABLE dbo.T ADD Note nvarchar(10) NULL;";
        let plan = plan_script(&provider, "DEV", script).await.expect("plan");
        assert_eq!(plan.plans.len(), 1);
        assert_eq!(plan.skipped.len(), 1);
        assert!(plan.skipped[0].starts_with("CREATE INDEX"));
        assert_eq!(
            plan.plans[0].implementation,
            "ALTER TABLE [dbo].[T] ADD [Note] nvarchar(10) NULL"
        );
        assert_eq!(provider.release_count(), 1);
    }

    #[tokio::test]
    async fn introspection_failure_is_recorded_on_the_plan() {
        let provider = FakeProvider::default().with(
            "DEV",
            FakeSession::new().fail_query("sys.computed_columns"),
        );
        let plan = plan_script(&provider, "DEV", "ALTER TABLE dbo.T DROP COLUMN A")
            .await
            .expect("plan");
        assert!(plan.plans[0].error.is_some());
        assert!(plan.plans[0].implementation.starts_with("-- Error analyzing table"));
    }

    #[tokio::test]
    async fn unknown_environment_is_a_configuration_error() {
        let provider = FakeProvider::default();
        let err = plan_script(&provider, "PROD", "ALTER TABLE dbo.T DROP COLUMN A")
            .await
            .expect_err("unknown env");
        assert!(matches!(err, EngineError::Configuration(_)));
    }
}
