//! CLI argument handling, exit codes, and JSON contracts, exercised through
//! the real binary with the dry-run executor.

use assert_cmd::Command;
use predicates::prelude::*;
use std::sync::OnceLock;

static CWD: OnceLock<tempfile::TempDir> = OnceLock::new();

fn formbridge() -> Command {
    // Keep config discovery away from any formbridge.toml in the source tree.
    let cwd = CWD.get_or_init(|| tempfile::TempDir::new().unwrap());
    let mut cmd = Command::cargo_bin("formbridge").unwrap();
    cmd.current_dir(cwd.path());
    cmd.env_remove("FORMBRIDGE_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn stages_lists_the_pipeline() {
    formbridge()
        .arg("stages")
        .assert()
        .success()
        .stdout(predicate::str::contains("form-structure"))
        .stdout(predicate::str::contains("template-generation"))
        .stdout(predicate::str::contains("40-template-generation.md"));
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    formbridge().assert().code(2);
}

#[test]
fn invalid_entity_name_exits_with_cli_args() {
    formbridge()
        .args(["run", "--entity", "../escape", "--dry-run"])
        .assert()
        .code(2);
}

#[test]
fn unknown_skip_token_exits_with_cli_args() {
    formbridge()
        .args([
            "run",
            "--entity",
            "Facility",
            "--skip-steps",
            "reports",
            "--dry-run",
        ])
        .assert()
        .code(2);
}

#[test]
fn unknown_stage_name_exits_with_cli_args() {
    formbridge()
        .args(["stage", "compile", "--entity", "Facility", "--dry-run"])
        .assert()
        .code(2);
}

#[test]
fn dry_run_pipeline_succeeds_and_writes_artifacts() {
    let out = tempfile::TempDir::new().unwrap();
    formbridge()
        .args(["run", "--entity", "Facility", "--dry-run"])
        .args(["--output", out.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("All stages completed."));

    let entity_dir = out.path().join("Facility");
    for name in [
        "00-form-structure.json",
        "10-business-logic.json",
        "20-data-access.json",
        "30-security.json",
        "40-template-generation.md",
    ] {
        assert!(entity_dir.join(name).is_file(), "{name}");
    }
}

#[test]
fn skipping_the_root_stage_without_artifacts_fails_the_run() {
    let out = tempfile::TempDir::new().unwrap();
    formbridge()
        .args([
            "run",
            "--entity",
            "Facility",
            "--dry-run",
            "--skip-steps",
            "form-structure",
        ])
        .args(["--output", out.path().to_str().unwrap()])
        .assert()
        .code(20)
        .stdout(predicate::str::contains("missing dependency"));
}

#[test]
fn run_json_emits_a_versioned_report() {
    let out = tempfile::TempDir::new().unwrap();
    let assert = formbridge()
        .args(["run", "--entity", "Facility", "--dry-run", "--json"])
        .args(["--output", out.path().to_str().unwrap()])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["schema_version"], "report.v1");
    assert_eq!(report["entity"], "Facility");
    assert_eq!(report["stages"].as_array().unwrap().len(), 5);
    for stage in report["stages"].as_array().unwrap() {
        assert_eq!(stage["status"], "succeeded");
    }
}

#[test]
fn status_json_reports_resume_hint() {
    let out = tempfile::TempDir::new().unwrap();

    // Produce the first two artifacts, then stop.
    formbridge()
        .args([
            "run",
            "--entity",
            "Facility",
            "--dry-run",
            "--skip-steps",
            "data-access,security,template-generation",
        ])
        .args(["--output", out.path().to_str().unwrap()])
        .assert()
        .success();

    let assert = formbridge()
        .args(["status", "--entity", "Facility", "--json"])
        .args(["--output", out.path().to_str().unwrap()])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["schema_version"], "status.v1");
    assert_eq!(status["resume_from"], "data-access");
    let stages = status["stages"].as_array().unwrap();
    assert_eq!(stages[0]["present"], true);
    assert_eq!(stages[2]["present"], false);
    assert!(stages[0]["blake3_first8"].is_string());
}

#[test]
fn status_on_fresh_entity_is_read_only() {
    let out = tempfile::TempDir::new().unwrap();
    formbridge()
        .args(["status", "--entity", "Facility"])
        .args(["--output", out.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("missing"));

    // status never creates the entity directory.
    assert!(!out.path().join("Facility").exists());
}

#[test]
fn single_stage_dry_run_succeeds_against_prior_artifacts() {
    let out = tempfile::TempDir::new().unwrap();
    formbridge()
        .args(["run", "--entity", "Facility", "--dry-run"])
        .args(["--output", out.path().to_str().unwrap()])
        .assert()
        .success();

    formbridge()
        .args(["stage", "business-logic", "--entity", "Facility", "--dry-run"])
        .args(["--output", out.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("business-logic"));
}
