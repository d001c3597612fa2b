mod common;

use std::fs;

use predicates::prelude::*;
use tempfile::TempDir;

fn write_script(dir: &TempDir) -> std::path::PathBuf {
    let script = dir.path().join("change.sql");
    fs::write(&script, "ALTER TABLE dbo.Orders ADD Note nvarchar(50) NULL\nGO\n").unwrap();
    script
}

#[test]
fn apply_to_unknown_environment_is_a_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let script = write_script(&temp_dir);

    let mut cmd = common::ddlplan_in(temp_dir.path());
    cmd.args(["apply", "--json", "--env", "QA", "--file"])
        .arg(&script)
        .env("DDLPLAN_ENVIRONMENTS", "DEV");
    let value = common::stderr_json(&mut cmd);

    assert_eq!(value["error"]["kind"], "Config");
    assert_eq!(value["error"]["message"], "Unknown environment 'QA'");
    assert!(
        !temp_dir.path().join("logs").join("audit.log").exists(),
        "nothing should be audited before the environment resolves"
    );
}

#[test]
fn rollback_to_unknown_environment_fails_before_connecting() {
    let temp_dir = TempDir::new().unwrap();
    let script = write_script(&temp_dir);

    common::ddlplan_in(temp_dir.path())
        .args(["rollback", "--dry-run", "--env", "PROD", "--file"])
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Unknown environment 'PROD'"));
}

#[test]
fn missing_script_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    common::ddlplan_in(temp_dir.path())
        .args(["apply", "--env", "DEV", "--file", "missing.sql"])
        .env("DDLPLAN_ENVIRONMENTS", "DEV")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read script"));
}

#[test]
fn apply_requires_env_and_file() {
    let temp_dir = TempDir::new().unwrap();
    common::ddlplan_in(temp_dir.path())
        .args(["apply", "--file", "change.sql"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--env"));
}

#[test]
fn diff_rejects_malformed_object_specs() {
    let temp_dir = TempDir::new().unwrap();
    let mut cmd = common::ddlplan_in(temp_dir.path());
    cmd.args(["diff", "--json", "--from", "DEV", "--to", "PROD", "INDEX:Orders"])
        .env("DDLPLAN_ENVIRONMENTS", "DEV,PROD");
    let value = common::stderr_json(&mut cmd);
    assert_eq!(value["error"]["kind"], "Config");
}
