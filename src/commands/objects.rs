use anyhow::Result;
use serde_json::json;

use crate::cli::{CliArgs, ObjectsArgs};
use crate::commands::common;
use crate::config::OutputFormat;
use crate::db::{ConnectionProvider, require_environment};
use crate::error::{AppError, ErrorKind};
use crate::introspect::{self, CatalogObject};
use crate::model::ObjectType;
use crate::output::{self, TableOptions, table};

pub fn run(args: &CliArgs, cmd: &ObjectsArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);
    let registry = common::registry(&resolved);
    require_environment(&registry, &cmd.env)?;

    let object_type = cmd
        .object_type
        .as_deref()
        .map(str::parse::<ObjectType>)
        .transpose()
        .map_err(|message| AppError::new(ErrorKind::Config, message))?;

    let objects = tokio::runtime::Runtime::new()?.block_on(async {
        let mut session = registry.acquire(&cmd.env).await?;
        let listed = introspect::list_objects(&mut session).await;
        registry.release(session).await;
        registry.close_all().await;
        Ok::<_, anyhow::Error>(listed?)
    })?;

    let objects: Vec<CatalogObject> = objects
        .into_iter()
        .filter(|object| object_type.is_none_or(|kind| object.object_type == kind))
        .filter(|object| {
            cmd.schema
                .as_deref()
                .is_none_or(|schema| object.schema.eq_ignore_ascii_case(schema))
        })
        .collect();

    if args.quiet {
        return Ok(());
    }

    if matches!(format, OutputFormat::Json) {
        let payload = json!({
            "environment": cmd.env,
            "count": objects.len(),
            "objects": objects,
        });
        output::print_json(&payload, common::json_pretty(&resolved))?;
        return Ok(());
    }

    let rows: Vec<Vec<String>> = objects
        .iter()
        .map(|object| {
            vec![
                object.object_type.to_string(),
                object.schema.clone(),
                object.name.clone(),
                object.parent.clone().unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        table::render_rows(
            &["Type", "Schema", "Name", "Parent"],
            &rows,
            format,
            &TableOptions::default()
        )
    );
    Ok(())
}
