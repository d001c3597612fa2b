use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::CliArgs;
use crate::config::OutputFormat;
use crate::config::{self, CliOverrides, ResolvedConfig};
use crate::db::ConnectionRegistry;
use crate::error::{AppError, ErrorKind};
use crate::model::ObjectRef;
use crate::output;

pub fn overrides_from_args(args: &CliArgs) -> CliOverrides {
    CliOverrides {
        config_path: args.config_path.clone(),
        env_file: args.env_file.clone(),
    }
}

pub fn load_config(args: &CliArgs) -> Result<ResolvedConfig> {
    let overrides = overrides_from_args(args);
    config::load_from_system(&overrides)
        .map_err(|err| AppError::new(ErrorKind::Config, format!("{err:#}")).into())
}

pub fn output_format(args: &CliArgs, resolved: &ResolvedConfig) -> OutputFormat {
    output::select_format(&args.output, &resolved.settings)
}

pub fn json_pretty(resolved: &ResolvedConfig) -> bool {
    resolved.settings.output.json_pretty
}

pub fn registry(resolved: &ResolvedConfig) -> ConnectionRegistry {
    ConnectionRegistry::from_config(resolved)
}

/// Reads a DDL script, refusing files over the configured size limit.
pub fn read_script(path: &Path, resolved: &ResolvedConfig) -> Result<String> {
    let limit = resolved.settings.max_script_bytes;
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to read script: {}", path.display()))?;
    if metadata.len() > limit as u64 {
        return Err(AppError::new(
            ErrorKind::Config,
            format!(
                "Script {} is {} bytes; the limit is {} bytes",
                path.display(),
                metadata.len(),
                limit
            ),
        )
        .into());
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read script: {}", path.display()))
}

pub fn parse_objects(specs: &[String]) -> Result<Vec<ObjectRef>> {
    specs
        .iter()
        .flat_map(|spec| spec.split(','))
        .map(str::trim)
        .filter(|spec| !spec.is_empty())
        .map(|spec| {
            ObjectRef::parse_spec(spec).map_err(|message| AppError::new(ErrorKind::Config, message).into())
        })
        .collect()
}

pub fn parse_limit(value: Option<usize>, default: usize, max: usize) -> usize {
    match value {
        Some(0) | None => default,
        Some(v) if v > max => max,
        Some(v) => v,
    }
}
