use anyhow::Result;
use serde_json::json;

use crate::cli::{CliArgs, PlanArgs};
use crate::commands::common;
use crate::config::OutputFormat;
use crate::diff;
use crate::output::{self, plan as plan_out};

pub fn run(args: &CliArgs, cmd: &PlanArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);
    let script = common::read_script(&cmd.file, &resolved)?;
    let registry = common::registry(&resolved);

    let planned = tokio::runtime::Runtime::new()?.block_on(async {
        let planned = diff::plan_script(&registry, &cmd.env, &script).await;
        registry.close_all().await;
        planned
    })?;

    if args.quiet {
        return Ok(());
    }

    if matches!(format, OutputFormat::Json) {
        let payload = json!({
            "environment": cmd.env,
            "file": cmd.file.display().to_string(),
            "plans": planned.plans,
            "skipped": planned.skipped,
            "notes": planned.notes,
        });
        output::print_json(&payload, common::json_pretty(&resolved))?;
        return Ok(());
    }

    println!("{}", plan_out::render_script_plan(&planned, format));
    Ok(())
}
