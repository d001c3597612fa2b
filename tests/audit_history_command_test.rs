mod common;

use std::fs;

use tempfile::TempDir;

#[test]
fn audit_reads_and_filters_the_log_file() {
    let temp_dir = TempDir::new().unwrap();
    let log = temp_dir.path().join("audit.log");
    let lines = [
        r#"{"timestamp":"2024-01-01T10:00:00.000Z","action":"apply","env":"DEV","dryRun":false,"success":true}"#,
        r#"{"timestamp":"2024-01-02T10:00:00.000Z","action":"rollback","env":"DEV","dryRun":false,"success":true}"#,
        r#"{"timestamp":"2024-01-03T10:00:00.000Z","action":"apply","env":"PROD","dryRun":true,"success":false}"#,
        "not json",
    ];
    fs::write(&log, lines.join("\n")).unwrap();

    let mut cmd = common::ddlplan_in(temp_dir.path());
    cmd.args(["audit", "--json", "--env", "DEV"])
        .env("DDLPLAN_AUDIT_LOG", &log);
    let value = common::stdout_json(&mut cmd);
    assert_eq!(value["count"], 2);

    let mut cmd = common::ddlplan_in(temp_dir.path());
    cmd.args(["audit", "--json", "--action", "apply", "--limit", "1"])
        .env("DDLPLAN_AUDIT_LOG", &log);
    let value = common::stdout_json(&mut cmd);
    assert_eq!(value["count"], 1);
    assert_eq!(value["entries"][0]["env"], "PROD");
}

#[test]
fn audit_with_no_log_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let mut cmd = common::ddlplan_in(temp_dir.path());
    cmd.args(["audit", "--json"]);
    let value = common::stdout_json(&mut cmd);
    assert_eq!(value["count"], 0);
}

#[test]
fn history_without_a_repository_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let mut cmd = common::ddlplan_in(temp_dir.path());
    cmd.args(["history", "--json", "--object", "dbo.Orders"])
        .env("DDLPLAN_ARCHIVE_DIR", temp_dir.path());
    let value = common::stdout_json(&mut cmd);
    assert_eq!(value["count"], 0);
    assert_eq!(value["object"], "dbo.Orders");
}
