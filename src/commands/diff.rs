use anyhow::Result;
use serde_json::json;

use crate::aggregate;
use crate::cli::{CliArgs, DiffArgs};
use crate::commands::common;
use crate::config::OutputFormat;
use crate::diff;
use crate::error::{AppError, ErrorKind};
use crate::order::{self, Ordering};
use crate::output::{self, plan as plan_out};

pub fn run(args: &CliArgs, cmd: &DiffArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);
    let objects = common::parse_objects(&cmd.objects)?;
    if objects.is_empty() {
        return Err(AppError::new(ErrorKind::Config, "No objects given").into());
    }
    let registry = common::registry(&resolved);

    let (plans, combined) = tokio::runtime::Runtime::new()?.block_on(async {
        let planned = diff::plan_environment_diff(&registry, &cmd.from, &cmd.to, &objects).await;
        let ordering = match (&planned, cmd.no_order) {
            (Ok(_), false) => order::resolve(&registry, &cmd.from, &objects).await,
            _ => Ok(Ordering::sequential(objects.iter().cloned())),
        };
        registry.close_all().await;
        let plans = planned?;
        let combined = aggregate::combine(&plans, &ordering?);
        Ok::<_, anyhow::Error>((plans, combined))
    })?;

    if args.quiet {
        return Ok(());
    }

    if matches!(format, OutputFormat::Json) {
        let payload = json!({
            "source": cmd.from,
            "target": cmd.to,
            "plans": plans,
            "combined": combined,
        });
        output::print_json(&payload, common::json_pretty(&resolved))?;
        return Ok(());
    }

    println!("{}", plan_out::render_combined_plan(&plans, &combined, format));
    Ok(())
}
