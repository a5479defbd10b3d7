//! End-to-end tests for the `fas2ipa completions` command.

#[allow(dead_code)]
mod common;
use common::prelude::*;

#[test]
fn test_completions_help() {
    let mut cmd = cargo_bin_cmd!("fas2ipa");
    cmd.arg("completions")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Generate shell completion scripts",
        ))
        .stdout(predicate::str::contains("bash"))
        .stdout(predicate::str::contains("zsh"))
        .stdout(predicate::str::contains("fish"));
}

#[test]
fn test_completions_bash() {
    let mut cmd = cargo_bin_cmd!("fas2ipa");
    cmd.arg("completions")
        .arg("bash")
        .assert()
        .success()
        .stdout(predicate::str::contains("_fas2ipa()"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("conflicts"));
}

#[test]
fn test_completions_zsh() {
    let mut cmd = cargo_bin_cmd!("fas2ipa");
    cmd.arg("completions")
        .arg("zsh")
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef fas2ipa"))
        .stdout(predicate::str::contains("--skip-groups"));
}

#[test]
fn test_completions_invalid_shell() {
    let mut cmd = cargo_bin_cmd!("fas2ipa");
    cmd.arg("completions")
        .arg("tcsh")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
