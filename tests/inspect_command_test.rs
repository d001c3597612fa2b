mod common;

use std::fs;

use predicates::prelude::*;
use tempfile::TempDir;

const SCRIPT: &str = "\
CREATE TABLE sales.Orders (
    ID int NOT NULL,
    Note nvarchar(50) NULL
)
GO
ALTER TABLE sales.Orders ADD Total decimal(10,2) NULL
GO
CREATE VIEW sales.OrderTotals AS SELECT ID, Total FROM sales.Orders
GO
";

#[test]
fn inspect_reports_batches_statements_and_schemas() {
    let temp_dir = TempDir::new().unwrap();
    let script = temp_dir.path().join("change.sql");
    fs::write(&script, SCRIPT).unwrap();

    let mut cmd = common::ddlplan_in(temp_dir.path());
    cmd.args(["inspect", "--json", "--file"]).arg(&script);
    let value = common::stdout_json(&mut cmd);

    assert_eq!(value["batchCount"], 3);
    let statements = value["statements"].as_array().expect("statements");
    assert_eq!(statements.len(), 3);
    assert_eq!(statements[0]["status"], "recognized");
    assert_eq!(statements[0]["value"]["statement"], "createTable");
    assert_eq!(statements[0]["value"]["table"], "Orders");
    assert_eq!(statements[1]["value"]["kind"], "ADD");
    assert_eq!(statements[2]["status"], "unrecognized");
    assert_eq!(value["schemas"], serde_json::json!(["sales"]));
}

#[test]
fn inspect_table_output_lists_statements() {
    let temp_dir = TempDir::new().unwrap();
    let script = temp_dir.path().join("change.sql");
    fs::write(&script, SCRIPT).unwrap();

    common::ddlplan_in(temp_dir.path())
        .args(["inspect", "--markdown", "--file"])
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("Batches: 3"))
        .stdout(predicate::str::contains("CREATE TABLE"))
        .stdout(predicate::str::contains("ALTER TABLE ADD"))
        .stdout(predicate::str::contains("not planned"));
}

#[test]
fn inspect_refuses_scripts_over_the_size_limit() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join(".ddlplan");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.yaml"), "settings:\n  maxScriptBytes: 16\n").unwrap();
    let script = temp_dir.path().join("change.sql");
    fs::write(&script, SCRIPT).unwrap();

    let mut cmd = common::ddlplan_in(temp_dir.path());
    cmd.args(["inspect", "--json", "--file"]).arg(&script);
    let value = common::stderr_json(&mut cmd);
    assert_eq!(value["error"]["kind"], "Config");
    assert!(
        value["error"]["message"]
            .as_str()
            .is_some_and(|m| m.contains("the limit is 16 bytes"))
    );
}
