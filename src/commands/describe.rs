use anyhow::{Result, anyhow};
use serde::Serialize;
use serde_json::json;

use crate::cli::{CliArgs, DescribeArgs};
use crate::commands::common;
use crate::config::OutputFormat;
use crate::db::{ConnectionProvider, SqlSession, require_environment};
use crate::error::{AppError, ErrorKind};
use crate::introspect::{self, CatalogDependency, TableSample};
use crate::model::{ColumnMetadata, ObjectRef, ObjectType, qualified_name};
use crate::output::{self, TableOptions, table};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Description {
    object: ObjectRef,
    script: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    columns: Vec<ColumnMetadata>,
    dependencies: Vec<CatalogDependency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample: Option<TableSample>,
}

fn object_from_args(cmd: &DescribeArgs) -> Result<ObjectRef> {
    let spec = match &cmd.object_type {
        Some(kind) => format!("{kind}:{}", cmd.object),
        None => cmd.object.clone(),
    };
    ObjectRef::parse_spec(&spec).map_err(|message| AppError::new(ErrorKind::Config, message).into())
}

async fn describe<S: SqlSession + ?Sized>(
    session: &mut S,
    object: &ObjectRef,
    sample_rows: Option<u32>,
) -> Result<Description> {
    let mut description = Description {
        object: object.clone(),
        script: String::new(),
        columns: Vec::new(),
        dependencies: Vec::new(),
        sample: None,
    };

    match object.object_type {
        ObjectType::Table => {
            let snapshot = introspect::snapshot(session, &object.schema, &object.name).await?;
            if !snapshot.exists() {
                return Err(not_found(object));
            }
            description.script = introspect::create_table_script(
                &object.schema,
                &object.name,
                &snapshot.columns,
                &snapshot.extras,
            );
            description.columns = snapshot.columns;
            if let Some(limit) = sample_rows.filter(|n| *n > 0) {
                description.sample =
                    Some(introspect::sample(session, &object.schema, &object.name, limit).await?);
            }
        }
        ObjectType::Index => {
            let table = object.table.as_deref().unwrap_or_default();
            let extras = introspect::table_extras(session, &object.schema, table).await?;
            let index = extras.index(&object.name).ok_or_else(|| not_found(object))?;
            description.script = index.create_sql(&qualified_name(&object.schema, table));
            return Ok(description);
        }
        _ => {
            description.script = introspect::definition(session, &object.schema, &object.name)
                .await?
                .ok_or_else(|| not_found(object))?;
        }
    }

    description.dependencies =
        introspect::dependencies(session, &object.schema, &object.name).await?;
    Ok(description)
}

fn not_found(object: &ObjectRef) -> anyhow::Error {
    anyhow!(AppError::new(ErrorKind::Query, format!("{object} not found")))
}

pub fn run(args: &CliArgs, cmd: &DescribeArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);
    let registry = common::registry(&resolved);
    require_environment(&registry, &cmd.env)?;
    let object = object_from_args(cmd)?;

    let description = tokio::runtime::Runtime::new()?.block_on(async {
        let mut session = registry.acquire(&cmd.env).await?;
        let described = describe(&mut session, &object, cmd.sample).await;
        registry.release(session).await;
        registry.close_all().await;
        described
    })?;

    if args.quiet {
        return Ok(());
    }

    if matches!(format, OutputFormat::Json) {
        let mut payload = json!(description);
        payload["environment"] = json!(cmd.env);
        output::print_json(&payload, common::json_pretty(&resolved))?;
        return Ok(());
    }

    let options = TableOptions::default();
    if matches!(format, OutputFormat::Markdown) {
        println!("```sql\n{}\n```", description.script.trim_end());
    } else {
        println!("{}", description.script.trim_end());
    }

    if !description.dependencies.is_empty() {
        let rows: Vec<Vec<String>> = description
            .dependencies
            .iter()
            .map(|dep| vec![dep.schema.clone(), dep.name.clone(), dep.class.clone()])
            .collect();
        println!();
        println!(
            "{}",
            table::render_rows(&["Schema", "Referenced", "Class"], &rows, format, &options)
        );
    }

    if let Some(sample) = &description.sample {
        println!();
        println!("Rows: {}", sample.count);
        println!("{}", table::render_result_set_table(&sample.rows, format, &options));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;
    use crate::db::fake::FakeSession;
    use crate::db::ResultSet;

    fn args(object: &str, object_type: Option<&str>) -> DescribeArgs {
        DescribeArgs {
            env: "DEV".to_string(),
            object: object.to_string(),
            object_type: object_type.map(str::to_string),
            sample: None,
        }
    }

    #[test]
    fn type_flag_prefixes_the_object_name() {
        let object = object_from_args(&args("sales.Totals", Some("view"))).expect("object");
        assert_eq!(object, ObjectRef::new(ObjectType::View, "sales", "Totals"));
        let object = object_from_args(&args("Orders", None)).expect("object");
        assert_eq!(object, ObjectRef::table("dbo", "Orders"));
    }

    #[tokio::test]
    async fn missing_definition_is_reported() {
        let mut session = FakeSession::new();
        let object = ObjectRef::new(ObjectType::View, "dbo", "Nope");
        let err = describe(&mut session, &object, None).await.expect_err("missing");
        assert_eq!(err.to_string(), "VIEW dbo.Nope not found");
    }

    #[tokio::test]
    async fn view_definition_is_returned_verbatim() {
        let body = "CREATE VIEW dbo.Totals AS SELECT 1 AS x";
        let mut session = FakeSession::new().respond(
            "OBJECT_DEFINITION",
            vec![ResultSet::new(&["definition"], vec![vec![Value::Text(body.to_string())]])],
        );
        let object = ObjectRef::new(ObjectType::View, "dbo", "Totals");
        let description = describe(&mut session, &object, None).await.expect("description");
        assert_eq!(description.script, body);
        assert!(description.dependencies.is_empty());
    }
}
