use std::io::{self, Write};

use crate::cli::build_cli;
use crate::error::{AppError, ErrorKind};

/// `ddlplan help [--all] [COMMAND]`. Advanced commands stay hidden unless `--all`.
pub fn run(show_all: bool, command: Option<&str>) -> anyhow::Result<()> {
    let mut root = build_cli(show_all);
    match command {
        Some(name) => {
            let sub = root.find_subcommand_mut(name).ok_or_else(|| {
                AppError::new(
                    ErrorKind::Config,
                    format!("Unknown command '{name}'; run `ddlplan help --all` to list them"),
                )
            })?;
            sub.print_long_help()?;
        }
        None => root.print_long_help()?,
    }
    io::stdout().flush()?;
    Ok(())
}
