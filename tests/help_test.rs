use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

const CORE: [&str; 10] = [
    "envs", "objects", "describe", "plan", "diff", "apply", "rollback", "inspect", "init", "config",
];
const ADVANCED: [&str; 2] = ["audit", "history"];

#[test]
fn help_shows_core_commands_only() {
    let mut cmd = cargo_bin_cmd!("ddlplan");
    cmd.arg("--help");
    let output = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&output);

    for name in CORE {
        assert!(stdout.contains(name), "missing core command: {}", name);
    }
    for name in ADVANCED {
        assert!(!stdout.contains(name), "advanced command leaked: {}", name);
    }
}

#[test]
fn help_all_shows_advanced_commands() {
    let mut cmd = cargo_bin_cmd!("ddlplan");
    cmd.args(["help", "--all"]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&output);

    for name in ADVANCED {
        assert!(stdout.contains(name), "missing advanced command: {}", name);
    }
}

#[test]
fn help_for_one_command_shows_its_flags() {
    let mut cmd = cargo_bin_cmd!("ddlplan");
    cmd.args(["help", "apply"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--rollback-file"));
}

#[test]
fn help_for_unknown_command_fails() {
    let mut cmd = cargo_bin_cmd!("ddlplan");
    cmd.args(["help", "migrate"])
        .env("NO_COLOR", "1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown command 'migrate'"));
}
