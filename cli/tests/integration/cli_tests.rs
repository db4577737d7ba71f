//! Argument parsing, preflight checks and configuration errors of the binary.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

const REQUIRED_VARS: [&str; 4] = [
    "KUBECONFIG",
    "AWS_SHARED_CREDENTIALS_FILE",
    "ARTIFACT_DIR",
    "KUBE_SSH_KEY_PATH",
];

fn winvm_e2e() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("winvm-e2e"));
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Command with none of the required environment variables set.
fn without_env() -> Command {
    let mut cmd = winvm_e2e();
    for var in REQUIRED_VARS {
        cmd.env_remove(var);
    }
    cmd
}

// --- Help and version ---

#[test]
fn test_help_flag_shows_usage() {
    winvm_e2e()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--binary-to-be-transferred"))
        .stdout(predicate::str::contains("cleanup"));
}

#[test]
fn test_version_flag_shows_version() {
    winvm_e2e()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("winvm-e2e 0.1.0"));
}

#[test]
fn test_version_command_shows_version() {
    winvm_e2e()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("winvm-e2e 0.1.0"));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let output = winvm_e2e()
        .args(["version", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["version"], "0.1.0");
}

// --- Argument validation ---

#[test]
fn test_no_args_requires_binary() {
    winvm_e2e()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--binary-to-be-transferred"));
}

#[test]
fn test_missing_binary_fails_before_reading_env() {
    without_env()
        .args(["--binary-to-be-transferred", "/nonexistent/wmcb_unit_test.exe"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_invalid_remote_name_is_rejected() {
    let binary = NamedTempFile::new().expect("tempfile");
    without_env()
        .arg("--binary-to-be-transferred")
        .arg(binary.path())
        .args(["--remote-name", r"..\evil.exe"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid remote file name"));
}

#[test]
fn test_unknown_subcommand_is_rejected() {
    winvm_e2e().arg("destroy-everything").assert().code(2);
}

// --- Configuration ---

#[test]
fn test_run_without_env_names_first_missing_var() {
    let binary = NamedTempFile::new().expect("tempfile");
    without_env()
        .arg("--binary-to-be-transferred")
        .arg(binary.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("KUBECONFIG is not set"));
}

#[test]
fn test_run_without_env_json_reports_config_error() {
    let binary = NamedTempFile::new().expect("tempfile");
    let output = without_env()
        .arg("--binary-to-be-transferred")
        .arg(binary.path())
        .arg("--json")
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(1));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["error"], true);
    assert_eq!(value["code"], "config");
    assert!(
        value["message"]
            .as_str()
            .is_some_and(|m| m.contains("KUBECONFIG")),
        "{value}"
    );
}

#[test]
fn test_cleanup_without_env_fails() {
    without_env()
        .arg("cleanup")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("KUBECONFIG is not set"));
}
