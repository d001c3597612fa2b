use std::io::{self, IsTerminal, Write};

use ddlplan::cli::{self, CliArgs};
use ddlplan::commands;
use ddlplan::error::classify_error;
use ddlplan::output::json;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = cli::parse();
    init_logging(args.verbose);
    if let Err(err) = commands::dispatch(&args) {
        report(&args, &err);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins over `-v`; driver chatter stays muted at the default level.
fn init_logging(verbose: u8) {
    let directives = match verbose {
        0 => "warn,tiberius=error",
        1 => "ddlplan=info,tiberius=warn",
        2 => "ddlplan=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn report(args: &CliArgs, err: &anyhow::Error) {
    let message = format!("{err:#}");
    let mut stderr = io::stderr();

    if args.output.json {
        let payload = json::error_json(&message, classify_error(err).as_str());
        if let Ok(body) = json::emit_json_value(&payload, true) {
            let _ = writeln!(stderr, "{body}");
        }
        return;
    }

    let colored = std::env::var_os("NO_COLOR").is_none() && stderr.is_terminal();
    let _ = if colored {
        writeln!(stderr, "{}", format!("Error: {message}").red())
    } else {
        writeln!(stderr, "Error: {message}")
    };
}
