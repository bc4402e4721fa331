use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("vibbo")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("orgs"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_config_help_shows_subcommands() {
    cargo_bin_cmd!("vibbo")
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("path"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("set-interval"));
}

#[test]
fn test_run_help_shows_org_flag() {
    cargo_bin_cmd!("vibbo")
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--org"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("vibbo")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.2"));
}
