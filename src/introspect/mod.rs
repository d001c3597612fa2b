//! Read-only catalog introspection: columns, table extras, dependencies,
//! object definitions, samples and the object listing.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::db::queries;
use crate::db::{ResultSet, SqlSession};
use crate::error::EngineError;
use crate::model::{ColumnMetadata, ObjectRef, ObjectType, qualified_name, quote_ident};

type Result<T> = std::result::Result<T, EngineError>;

fn failure(schema: &str, name: &str, err: anyhow::Error) -> EngineError {
    EngineError::Introspection {
        object: format!("{schema}.{name}"),
        message: err.to_string(),
    }
}

async fn first_set<S: SqlSession + ?Sized>(
    session: &mut S,
    sql: &str,
    schema: &str,
    name: &str,
) -> Result<ResultSet> {
    let target = qualified_name(schema, name);
    let sets = session
        .query(sql, &[target.as_str()])
        .await
        .map_err(|err| failure(schema, name, err))?;
    Ok(sets.into_iter().next().unwrap_or_default())
}

/// Columns of `schema.table` in column_id order; empty when the table does not exist.
pub async fn columns<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnMetadata>> {
    let set = first_set(session, queries::COLUMNS, schema, table).await?;
    let reader = set.reader();
    let columns: Vec<ColumnMetadata> = set
        .rows
        .iter()
        .map(|row| ColumnMetadata {
            name: reader.text_or_empty(row, "column_name"),
            sql_type: reader.text_or_empty(row, "type_name"),
            max_length: reader.int(row, "max_length"),
            precision: reader.int(row, "precision"),
            scale: reader.int(row, "scale"),
            is_nullable: reader.bool(row, "is_nullable"),
            default_definition: reader.text(row, "default_definition"),
            is_computed: reader.bool(row, "is_computed"),
            computed_definition: reader.text(row, "computed_definition"),
            is_identity: reader.bool(row, "is_identity"),
        })
        .collect();
    debug!(schema, table, count = columns.len(), "loaded columns");
    Ok(columns)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKey {
    pub name: String,
    /// Bracketed key columns in key order.
    pub columns: Vec<String>,
}

impl PrimaryKey {
    pub fn create_sql(&self, table: &str) -> String {
        format!(
            "ALTER TABLE {table} ADD CONSTRAINT {} PRIMARY KEY ({});",
            quote_ident(&self.name),
            self.columns.join(",")
        )
    }

    pub fn drop_sql(&self, table: &str) -> String {
        format!("ALTER TABLE {table} DROP CONSTRAINT {};", quote_ident(&self.name))
    }

    pub fn references(&self, column: &str) -> bool {
        self.columns.iter().any(|c| column_of(c).eq_ignore_ascii_case(column))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDef {
    pub name: String,
    pub is_unique: bool,
    /// Bracketed key columns, with ` DESC` where the key is descending.
    pub key_columns: Vec<String>,
    pub included: Vec<String>,
}

impl IndexDef {
    pub fn create_sql(&self, table: &str) -> String {
        let unique = if self.is_unique { "UNIQUE " } else { "" };
        let include = if self.included.is_empty() {
            String::new()
        } else {
            format!(" INCLUDE ({})", self.included.join(","))
        };
        format!(
            "CREATE {unique}NONCLUSTERED INDEX {} ON {table} ({}){include};",
            quote_ident(&self.name),
            self.key_columns.join(",")
        )
    }

    pub fn drop_sql(&self, table: &str) -> String {
        format!("DROP INDEX {} ON {table};", quote_ident(&self.name))
    }

    pub fn references(&self, column: &str) -> bool {
        self.key_columns
            .iter()
            .chain(self.included.iter())
            .any(|c| column_of(c).eq_ignore_ascii_case(column))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultConstraint {
    pub column: String,
    pub name: String,
    pub definition: String,
}

impl DefaultConstraint {
    pub fn create_sql(&self, table: &str) -> String {
        format!(
            "ALTER TABLE {table} ADD CONSTRAINT {} DEFAULT {} FOR {}",
            quote_ident(&self.name),
            self.definition,
            quote_ident(&self.column)
        )
    }

    pub fn drop_sql(&self, table: &str) -> String {
        format!("ALTER TABLE {table} DROP CONSTRAINT {}", quote_ident(&self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckConstraint {
    pub name: String,
    pub definition: String,
}

impl CheckConstraint {
    pub fn create_sql(&self, table: &str) -> String {
        format!(
            "ALTER TABLE {table} ADD CONSTRAINT {} CHECK {}",
            quote_ident(&self.name),
            self.definition
        )
    }

    pub fn drop_sql(&self, table: &str) -> String {
        format!("ALTER TABLE {table} DROP CONSTRAINT {}", quote_ident(&self.name))
    }

    /// The catalog always writes column references bracketed.
    pub fn references(&self, column: &str) -> bool {
        self.definition
            .to_lowercase()
            .contains(&quote_ident(column).to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDef {
    pub name: String,
    pub definition: String,
}

/// Constraints, indexes and triggers hanging off one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableExtras {
    pub primary_key: Option<PrimaryKey>,
    pub indexes: Vec<IndexDef>,
    pub defaults_by_column: BTreeMap<String, DefaultConstraint>,
    pub check_constraints: Vec<CheckConstraint>,
    pub triggers: Vec<TriggerDef>,
}

impl TableExtras {
    pub fn default_for(&self, column: &str) -> Option<&DefaultConstraint> {
        self.defaults_by_column
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, constraint)| constraint)
    }

    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|idx| idx.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key_sql(&self, table: &str) -> Option<String> {
        self.primary_key.as_ref().map(|pk| pk.create_sql(table))
    }

    pub fn index_sql(&self, table: &str) -> Vec<String> {
        self.indexes.iter().map(|idx| idx.create_sql(table)).collect()
    }

    pub fn default_sql(&self, table: &str) -> Vec<String> {
        self.defaults_by_column.values().map(|d| d.create_sql(table)).collect()
    }

    pub fn check_sql(&self, table: &str) -> Vec<String> {
        self.check_constraints.iter().map(|c| c.create_sql(table)).collect()
    }

    pub fn trigger_sql(&self) -> Vec<String> {
        self.triggers.iter().map(|t| t.definition.trim().to_string()).collect()
    }
}

/// Live shape of one table. A table with no columns does not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub columns: Vec<ColumnMetadata>,
    pub extras: TableExtras,
}

impl TableSnapshot {
    pub fn exists(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// `[a],[b] DESC,` as produced by `FOR XML PATH('')` into its items.
fn split_column_list(raw: &str) -> Vec<String> {
    let raw = raw
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_bracket = false;
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '[' if !in_bracket => {
                in_bracket = true;
                current.push(ch);
            }
            ']' if in_bracket => {
                current.push(ch);
                if chars.peek() == Some(&']') {
                    current.push(']');
                    chars.next();
                } else {
                    in_bracket = false;
                }
            }
            ',' if !in_bracket => {
                let item = current.trim();
                if !item.is_empty() {
                    items.push(item.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let item = current.trim();
    if !item.is_empty() {
        items.push(item.to_string());
    }
    items
}

/// Bare column name of a list item such as `[Name] DESC`.
fn column_of(item: &str) -> String {
    let item = item.trim();
    let item = item
        .strip_suffix(" DESC")
        .or_else(|| item.strip_suffix(" ASC"))
        .unwrap_or(item)
        .trim();
    item.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(|inner| inner.replace("]]", "]"))
        .unwrap_or_else(|| item.to_string())
}

pub async fn table_extras<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
    table: &str,
) -> Result<TableExtras> {
    let mut extras = TableExtras::default();

    let defaults = first_set(session, queries::DEFAULT_CONSTRAINTS, schema, table).await?;
    let reader = defaults.reader();
    for row in &defaults.rows {
        let column = reader.text_or_empty(row, "column_name");
        let Some(definition) = reader.text(row, "definition") else {
            continue;
        };
        extras.defaults_by_column.insert(
            column.clone(),
            DefaultConstraint {
                column,
                name: reader.text_or_empty(row, "constraint_name"),
                definition,
            },
        );
    }

    let indexes = first_set(session, queries::INDEXES, schema, table).await?;
    let reader = indexes.reader();
    for row in &indexes.rows {
        let key_columns = split_column_list(&reader.text_or_empty(row, "key_columns"));
        if key_columns.is_empty() {
            continue;
        }
        extras.indexes.push(IndexDef {
            name: reader.text_or_empty(row, "index_name"),
            is_unique: reader.bool(row, "is_unique"),
            key_columns,
            included: split_column_list(&reader.text_or_empty(row, "included_columns")),
        });
    }

    let pk = first_set(session, queries::PRIMARY_KEY, schema, table).await?;
    if let Some(row) = pk.rows.first() {
        let reader = pk.reader();
        let columns = split_column_list(&reader.text_or_empty(row, "pk_columns"));
        if !columns.is_empty() {
            extras.primary_key = Some(PrimaryKey {
                name: reader.text_or_empty(row, "constraint_name"),
                columns,
            });
        }
    }

    let checks = first_set(session, queries::CHECK_CONSTRAINTS, schema, table).await?;
    let reader = checks.reader();
    extras.check_constraints = checks
        .rows
        .iter()
        .filter_map(|row| {
            reader.text(row, "definition").map(|definition| CheckConstraint {
                name: reader.text_or_empty(row, "constraint_name"),
                definition,
            })
        })
        .collect();

    let triggers = first_set(session, queries::TRIGGERS, schema, table).await?;
    let reader = triggers.reader();
    extras.triggers = triggers
        .rows
        .iter()
        .filter_map(|row| {
            reader.text(row, "definition").map(|definition| TriggerDef {
                name: reader.text_or_empty(row, "trigger_name"),
                definition,
            })
        })
        .collect();

    Ok(extras)
}

/// Columns and extras in one call. Extras are skipped for a missing table.
pub async fn snapshot<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
    table: &str,
) -> Result<TableSnapshot> {
    let columns = columns(session, schema, table).await?;
    if columns.is_empty() {
        return Ok(TableSnapshot::default());
    }
    let extras = table_extras(session, schema, table).await?;
    Ok(TableSnapshot { columns, extras })
}

/// An object referenced by another object's definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDependency {
    pub schema: String,
    pub name: String,
    pub class: String,
}

pub async fn dependencies<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
    name: &str,
) -> Result<Vec<CatalogDependency>> {
    let set = first_set(session, queries::DEPENDENCIES, schema, name).await?;
    let reader = set.reader();
    Ok(set
        .rows
        .iter()
        .filter_map(|row| {
            let entity = reader
                .text(row, "referenced_entity_name")
                .filter(|n| !n.is_empty())?;
            Some(CatalogDependency {
                schema: reader
                    .text(row, "referenced_schema_name")
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "dbo".to_string()),
                name: entity,
                class: reader.text_or_empty(row, "referenced_class_desc"),
            })
        })
        .collect())
}

/// Module text of a view, procedure, function or trigger.
pub async fn definition<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
    name: &str,
) -> Result<Option<String>> {
    let set = first_set(session, queries::DEFINITION, schema, name).await?;
    let reader = set.reader();
    Ok(set
        .rows
        .first()
        .and_then(|row| reader.text(row, "definition"))
        .filter(|text| !text.trim().is_empty()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSample {
    pub count: i64,
    pub rows: ResultSet,
}

pub async fn sample<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
    table: &str,
    limit: u32,
) -> Result<TableSample> {
    let target = qualified_name(schema, table);
    let count_sql = format!("SELECT COUNT(*) AS cnt FROM {target}");
    let sample_sql = format!("SELECT TOP ({limit}) * FROM {target}");

    let counts = session
        .query(&count_sql, &[])
        .await
        .map_err(|err| failure(schema, table, err))?;
    let count = counts
        .first()
        .and_then(|set| set.rows.first().map(|row| set.reader().int(row, "cnt")))
        .unwrap_or(0);
    let rows = session
        .query(&sample_sql, &[])
        .await
        .map_err(|err| failure(schema, table, err))?
        .into_iter()
        .next()
        .unwrap_or_default();
    Ok(TableSample { count, rows })
}

/// One row of the object listing. `parent` is the owning table of triggers and indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogObject {
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub schema: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl CatalogObject {
    pub fn object_ref(&self) -> ObjectRef {
        match (self.object_type, &self.parent) {
            (ObjectType::Index, Some(table)) => ObjectRef::index(&self.schema, table, &self.name),
            (kind, _) => ObjectRef::new(kind, &self.schema, &self.name),
        }
    }
}

pub async fn list_objects<S: SqlSession + ?Sized>(session: &mut S) -> Result<Vec<CatalogObject>> {
    let sets = session
        .query(queries::OBJECTS, &[])
        .await
        .map_err(|err| EngineError::Introspection {
            object: "catalog".to_string(),
            message: err.to_string(),
        })?;
    let Some(set) = sets.into_iter().next() else {
        return Ok(Vec::new());
    };
    let reader = set.reader();
    Ok(set
        .rows
        .iter()
        .filter_map(|row| {
            let object_type = reader.text_or_empty(row, "object_type").parse().ok()?;
            Some(CatalogObject {
                object_type,
                schema: reader.text_or_empty(row, "schema_name"),
                name: reader.text_or_empty(row, "object_name"),
                parent: reader.text(row, "parent_name"),
            })
        })
        .collect())
}

/// CREATE TABLE text followed by the primary key, indexes, named defaults,
/// checks and triggers. Each trigger runs in its own batch.
pub fn create_table_script(
    schema: &str,
    table: &str,
    columns: &[ColumnMetadata],
    extras: &TableExtras,
) -> String {
    let target = qualified_name(schema, table);
    let column_defs: Vec<String> = columns
        .iter()
        .map(|col| {
            let inline_default = extras.default_for(&col.name).is_none();
            format!(
                "{} {}",
                quote_ident(&col.name),
                col.definition_with_default(inline_default)
            )
        })
        .collect();

    let mut statements = vec![format!(
        "CREATE TABLE {target} (\n  {}\n);",
        column_defs.join(",\n  ")
    )];
    statements.extend(extras.primary_key_sql(&target));
    statements.extend(extras.index_sql(&target));
    statements.extend(extras.default_sql(&target));
    statements.extend(extras.check_sql(&target));

    let mut script = statements.join("\n");
    for trigger in extras.trigger_sql() {
        script.push_str("\nGO\n");
        script.push_str(&trigger);
    }
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;
    use crate::db::fake::FakeSession;

    fn text(value: &str) -> Value {
        Value::Text(value.to_string())
    }

    fn column_rows() -> ResultSet {
        ResultSet::new(
            &[
                "column_name",
                "type_name",
                "max_length",
                "precision",
                "scale",
                "is_nullable",
                "is_identity",
                "default_definition",
                "is_computed",
                "computed_definition",
            ],
            vec![
                vec![
                    text("Id"),
                    text("int"),
                    Value::Int(4),
                    Value::Int(10),
                    Value::Int(0),
                    Value::Bool(false),
                    Value::Bool(true),
                    Value::Null,
                    Value::Bool(false),
                    Value::Null,
                ],
                vec![
                    text("Name"),
                    text("nvarchar"),
                    Value::Int(100),
                    Value::Int(0),
                    Value::Int(0),
                    Value::Bool(true),
                    Value::Bool(false),
                    text("(N'x')"),
                    Value::Bool(false),
                    Value::Null,
                ],
            ],
        )
    }

    fn customers_session() -> FakeSession {
        FakeSession::new()
            .respond("sys.computed_columns", vec![column_rows()])
            .respond(
                "sys.default_constraints",
                vec![ResultSet::new(
                    &["column_name", "constraint_name", "definition"],
                    vec![vec![text("Name"), text("DF_Customers_Name"), text("(N'x')")]],
                )],
            )
            .respond(
                "is_hypothetical",
                vec![ResultSet::new(
                    &["index_name", "is_unique", "key_columns", "included_columns"],
                    vec![vec![
                        text("IX_Customers_Name"),
                        Value::Bool(false),
                        text("[Name] DESC,"),
                        text("[Id],"),
                    ]],
                )],
            )
            .respond(
                "sys.key_constraints",
                vec![ResultSet::new(
                    &["constraint_name", "pk_columns"],
                    vec![vec![text("PK_Customers"), text("[Id],")]],
                )],
            )
    }

    #[tokio::test]
    async fn reads_columns_with_bound_qualified_name() {
        let mut session = customers_session();
        let cols = columns(&mut session, "sales", "Customers").await.expect("columns");
        assert_eq!(cols.len(), 2);
        assert!(cols[0].is_identity);
        assert_eq!(cols[1].type_spec(), "nvarchar(50)");
        assert_eq!(cols[1].default_definition.as_deref(), Some("(N'x')"));
        assert_eq!(session.queries[0].1, vec!["[sales].[Customers]".to_string()]);
    }

    #[tokio::test]
    async fn extras_render_constraint_and_index_sql() {
        let mut session = customers_session();
        let extras = table_extras(&mut session, "dbo", "Customers").await.expect("extras");
        let target = "[dbo].[Customers]";
        assert_eq!(
            extras.primary_key_sql(target).as_deref(),
            Some("ALTER TABLE [dbo].[Customers] ADD CONSTRAINT [PK_Customers] PRIMARY KEY ([Id]);")
        );
        assert_eq!(
            extras.index_sql(target),
            vec![
                "CREATE NONCLUSTERED INDEX [IX_Customers_Name] ON [dbo].[Customers] ([Name] DESC) INCLUDE ([Id]);"
                    .to_string()
            ]
        );
        assert_eq!(
            extras.default_sql(target),
            vec![
                "ALTER TABLE [dbo].[Customers] ADD CONSTRAINT [DF_Customers_Name] DEFAULT (N'x') FOR [Name]"
                    .to_string()
            ]
        );
        assert!(extras.indexes[0].references("name"));
        assert!(extras.indexes[0].references("Id"));
        assert!(extras.primary_key.as_ref().is_some_and(|pk| pk.references("ID")));
    }

    #[tokio::test]
    async fn missing_table_yields_empty_snapshot() {
        let mut session = FakeSession::new();
        let snap = snapshot(&mut session, "dbo", "Nope").await.expect("snapshot");
        assert!(!snap.exists());
        assert_eq!(session.queries.len(), 1);
    }

    #[tokio::test]
    async fn query_failures_become_introspection_errors() {
        let mut session = FakeSession::new().fail_query("sys.computed_columns");
        let err = columns(&mut session, "dbo", "T").await.expect_err("should fail");
        assert!(matches!(err, EngineError::Introspection { ref object, .. } if object == "dbo.T"));
    }

    #[tokio::test]
    async fn dependencies_default_schema_and_drop_unnamed_rows() {
        let mut session = FakeSession::new().respond(
            "sql_expression_dependencies",
            vec![ResultSet::new(
                &["referenced_schema_name", "referenced_entity_name", "referenced_class_desc"],
                vec![
                    vec![Value::Null, text("Orders"), text("OBJECT_OR_COLUMN")],
                    vec![text("sales"), Value::Null, text("OBJECT_OR_COLUMN")],
                ],
            )],
        );
        let deps = dependencies(&mut session, "dbo", "vOrders").await.expect("deps");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].schema, "dbo");
        assert_eq!(deps[0].name, "Orders");
    }

    #[tokio::test]
    async fn blank_definition_is_none() {
        let mut session = FakeSession::new().respond(
            "OBJECT_DEFINITION(OBJECT_ID",
            vec![ResultSet::new(&["definition"], vec![vec![text("  ")]])],
        );
        assert_eq!(definition(&mut session, "dbo", "v").await.expect("definition"), None);
    }

    #[tokio::test]
    async fn sample_quotes_identifiers() {
        let mut session = FakeSession::new().respond(
            "COUNT(*)",
            vec![ResultSet::new(&["cnt"], vec![vec![Value::Int(42)]])],
        );
        let sample = sample(&mut session, "dbo", "odd]name", 3).await.expect("sample");
        assert_eq!(sample.count, 42);
        assert_eq!(session.queries[1].0, "SELECT TOP (3) * FROM [dbo].[odd]]name]");
    }

    #[tokio::test]
    async fn lists_objects_with_parents() {
        let mut session = FakeSession::new().respond(
            "UNION ALL",
            vec![ResultSet::new(
                &["object_type", "schema_name", "object_name", "parent_name"],
                vec![
                    vec![text("TABLE"), text("dbo"), text("Orders"), Value::Null],
                    vec![text("INDEX"), text("dbo"), text("IX_Orders"), text("Orders")],
                ],
            )],
        );
        let objects = list_objects(&mut session).await.expect("objects");
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].object_ref(), ObjectRef::index("dbo", "Orders", "IX_Orders"));
    }

    #[test]
    fn splits_xml_column_lists() {
        assert_eq!(
            split_column_list("[a],[b]] c] DESC,"),
            vec!["[a]".to_string(), "[b]] c] DESC".to_string()]
        );
        assert_eq!(column_of("[b]] c] DESC"), "b] c");
        assert!(split_column_list("").is_empty());
    }

    #[tokio::test]
    async fn create_script_keeps_named_defaults_out_of_column_list() {
        let mut session = customers_session().respond(
            "tr.is_ms_shipped",
            vec![ResultSet::new(
                &["trigger_name", "definition"],
                vec![vec![text("trg"), text("CREATE TRIGGER trg ON dbo.Customers AFTER INSERT AS SELECT 1")]],
            )],
        );
        let snap = snapshot(&mut session, "dbo", "Customers").await.expect("snapshot");
        let script = create_table_script("dbo", "Customers", &snap.columns, &snap.extras);
        assert!(script.starts_with(
            "CREATE TABLE [dbo].[Customers] (\n  [Id] int IDENTITY NOT NULL,\n  [Name] nvarchar(50) NULL\n);"
        ));
        assert!(script.contains("ADD CONSTRAINT [DF_Customers_Name] DEFAULT (N'x') FOR [Name]"));
        assert!(script.ends_with("\nGO\nCREATE TRIGGER trg ON dbo.Customers AFTER INSERT AS SELECT 1"));
    }
}
