pub mod json;
pub mod plan;
pub mod table;

use std::io::{self, IsTerminal, Write};

use serde::Serialize;

use crate::cli::OutputFlags;
use crate::config::{OutputFormat, SettingsResolved};

pub use table::TableOptions;

/// Explicit flags win; otherwise the configured default on a terminal and
/// markdown when stdout is piped.
pub fn select_format(flags: &OutputFlags, settings: &SettingsResolved) -> OutputFormat {
    if flags.json {
        return OutputFormat::Json;
    }
    if flags.markdown {
        return OutputFormat::Markdown;
    }
    if flags.pretty {
        return OutputFormat::Pretty;
    }

    if io::stdout().is_terminal() {
        settings.output.default_format
    } else {
        OutputFormat::Markdown
    }
}

/// Writes one JSON document to stdout.
pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let body = json::emit_json(value, pretty)?;
    writeln!(io::stdout(), "{}", body)?;
    Ok(())
}
