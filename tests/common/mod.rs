#![allow(dead_code)]

use std::env;
use std::ffi::OsStr;
use std::path::Path;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;

pub fn integration_enabled() -> bool {
    env::var("DDLPLAN_INTEGRATION_TESTS")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Environment used by the live tests; defaults to `DEV`.
pub fn integration_env() -> String {
    env::var("DDLPLAN_TEST_ENV").unwrap_or_else(|_| "DEV".to_string())
}

/// `ddlplan` running in `dir`, isolated from any config above it or in the
/// user's config directory.
pub fn ddlplan_in(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("ddlplan");
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env("NO_COLOR", "1")
        .env_remove("DDLPLAN_CONFIG")
        .env_remove("DDLPLAN_ENVIRONMENTS")
        .env_remove("DDLPLAN_AUDIT_LOG")
        .env_remove("DDLPLAN_ARCHIVE_DIR")
        .env_remove("RUST_LOG");
    cmd
}

pub fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = cargo_bin_cmd!("ddlplan");
    cmd.args(args);
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("json")
}

pub fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("json")
}

pub fn stderr_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().failure().get_output().stderr.clone();
    serde_json::from_slice(&output).expect("json error")
}
