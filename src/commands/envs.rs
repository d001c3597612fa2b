use std::time::Instant;

use anyhow::Result;
use serde_json::json;

use crate::cli::{CliArgs, EnvsArgs};
use crate::commands::common;
use crate::config::OutputFormat;
use crate::db::connection::describe_target;
use crate::db::{ConnectionProvider, SqlSession};
use crate::output::{self, TableOptions, table};

struct EnvStatus {
    name: String,
    target: String,
    user: String,
    check: Option<Result<u128, String>>,
}

pub fn run(args: &CliArgs, cmd: &EnvsArgs) -> Result<()> {
    let resolved = common::load_config(args)?;
    let format = common::output_format(args, &resolved);
    let registry = common::registry(&resolved);

    let mut statuses: Vec<EnvStatus> = registry
        .environments()
        .map(|(name, settings)| EnvStatus {
            name: name.clone(),
            target: describe_target(settings),
            user: settings.user.clone().unwrap_or_default(),
            check: None,
        })
        .collect();

    if cmd.check {
        tokio::runtime::Runtime::new()?.block_on(async {
            for status in statuses.iter_mut() {
                let started = Instant::now();
                let outcome = match registry.acquire(&status.name).await {
                    Ok(mut session) => {
                        let probe = session.query("SELECT 1 AS ok", &[]).await;
                        registry.release(session).await;
                        probe.map(|_| started.elapsed().as_millis())
                    }
                    Err(err) => Err(err),
                };
                status.check = Some(outcome.map_err(|err| format!("{err:#}")));
            }
            registry.close_all().await;
        });
    }

    if args.quiet {
        return Ok(());
    }

    if matches!(format, OutputFormat::Json) {
        let environments: Vec<serde_json::Value> = statuses
            .iter()
            .map(|status| {
                let mut value = json!({
                    "name": status.name,
                    "target": status.target,
                    "user": status.user,
                });
                match &status.check {
                    Some(Ok(latency)) => {
                        value["reachable"] = json!(true);
                        value["latencyMs"] = json!(latency);
                    }
                    Some(Err(message)) => {
                        value["reachable"] = json!(false);
                        value["error"] = json!(message);
                    }
                    None => {}
                }
                value
            })
            .collect();
        let payload = json!({ "environments": environments });
        output::print_json(&payload, common::json_pretty(&resolved))?;
        return Ok(());
    }

    if statuses.is_empty() {
        println!("No environments configured. Run `ddlplan init` or set DDLPLAN_ENVIRONMENTS.");
        return Ok(());
    }

    let mut headers = vec!["Environment", "Target", "User"];
    if cmd.check {
        headers.push("Status");
    }
    let rows: Vec<Vec<String>> = statuses
        .iter()
        .map(|status| {
            let mut row = vec![status.name.clone(), status.target.clone(), status.user.clone()];
            match &status.check {
                Some(Ok(latency)) => row.push(format!("ok ({latency} ms)")),
                Some(Err(message)) => row.push(format!("unreachable: {message}")),
                None => {}
            }
            row
        })
        .collect();
    println!(
        "{}",
        table::render_rows(&headers, &rows, format, &TableOptions::default())
    );
    Ok(())
}
