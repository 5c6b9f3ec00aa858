use assert_cmd::cargo_bin_cmd;
use predicates::prelude::*;

/// Help lists every setting together with its environment variable
#[test]
fn test_help_lists_settings() {
    let mut cmd = cargo_bin_cmd!("sitestackd");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--listen"))
        .stdout(predicate::str::contains("SITESTACK_LISTEN"))
        .stdout(predicate::str::contains("--engine"))
        .stdout(predicate::str::contains("--error-mode"))
        .stdout(predicate::str::contains("--session-ttl"));
}

#[test]
fn test_version() {
    let mut cmd = cargo_bin_cmd!("sitestackd");
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sitestackd"));
}

/// An unknown engine is rejected before anything starts
#[test]
fn test_rejects_unknown_engine() {
    let mut cmd = cargo_bin_cmd!("sitestackd");
    cmd.args(["--engine", "terraform"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("terraform"));
}
