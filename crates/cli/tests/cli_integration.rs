//! CLI integration tests for the `run` and `validate` subcommands.
//!
//! Uses `assert_cmd` to spawn the `stepsim` binary against definitions,
//! mocks and configuration written into a temporary directory, and checks
//! exit codes, stdout and stderr.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn stepsim() -> Command {
    cargo_bin_cmd!("stepsim")
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

const ROUTING: &str = r#"{
  "StartAt": "Route",
  "States": {
    "Route": {
      "Type": "Choice",
      "Choices": [{"Variable": "$.amount", "NumericGreaterThan": 100, "Next": "High"}],
      "Default": "Low"
    },
    "High": {"Type": "Pass", "Result": "high", "ResultPath": "$.tier", "End": true},
    "Low": {"Type": "Pass", "Result": "low", "ResultPath": "$.tier", "End": true}
  }
}"#;

const CHARGE: &str = r#"{
  "StartAt": "Charge",
  "States": {
    "Charge": {"Type": "Task", "Resource": "arn:aws:lambda:charge", "End": true}
  }
}"#;

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    stepsim()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Amazon States Language"));
}

#[test]
fn version_exits_0() {
    stepsim()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stepsim"));
}

// ──────────────────────────────────────────────
// 2. Validate
// ──────────────────────────────────────────────

#[test]
fn validate_accepts_a_good_definition() {
    let dir = TempDir::new().unwrap();
    let def = write(&dir, "routing.json", ROUTING);
    stepsim()
        .args(["validate"])
        .arg(&def)
        .assert()
        .success()
        .stdout(predicate::str::contains("valid (3 states, JSONPath)"));
}

#[test]
fn validate_reports_unsupported_field_with_suggestion() {
    let dir = TempDir::new().unwrap();
    let def = write(
        &dir,
        "bad.json",
        r#"{
          "QueryLanguage": "JSONata",
          "StartAt": "Call",
          "States": {
            "Call": {"Type": "Task", "Resource": "arn:x", "Parameters": {}, "End": true}
          }
        }"#,
    );
    stepsim()
        .args(["validate"])
        .arg(&def)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Parameters"))
        .stderr(predicate::str::contains("Arguments"));
}

#[test]
fn validate_reads_yaml() {
    let dir = TempDir::new().unwrap();
    let def = write(
        &dir,
        "hello.yaml",
        "StartAt: Hello\nStates:\n  Hello:\n    Type: Pass\n    End: true\n",
    );
    stepsim()
        .args(["--output", "json", "validate"])
        .arg(&def)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\":true"));
}

#[test]
fn validate_missing_file_exits_1() {
    stepsim()
        .args(["validate", "does-not-exist.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error reading file"));
}

// ──────────────────────────────────────────────
// 3. Run
// ──────────────────────────────────────────────

#[test]
fn run_prints_text_summary() {
    let dir = TempDir::new().unwrap();
    let def = write(&dir, "routing.json", ROUTING);
    stepsim()
        .arg("run")
        .arg(&def)
        .args(["--input", r#"{"amount": 150}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("status: SUCCEEDED"))
        .stdout(predicate::str::contains("Route -> High"));
}

#[test]
fn run_json_output_is_the_execution_result() {
    let dir = TempDir::new().unwrap();
    let def = write(&dir, "routing.json", ROUTING);
    let input = write(&dir, "input.json", r#"{"amount": 50}"#);
    let out = stepsim()
        .args(["--output", "json", "run"])
        .arg(&def)
        .arg("--input")
        .arg(format!("@{}", input.display()))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let result: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(result["success"], serde_json::json!(true));
    assert_eq!(result["executionPath"], serde_json::json!(["Route", "Low"]));
    assert_eq!(result["output"]["tier"], serde_json::json!("low"));
    assert!(result.get("stateExecutions").is_none());
}

#[test]
fn run_verbose_includes_state_traces() {
    let dir = TempDir::new().unwrap();
    let def = write(&dir, "routing.json", ROUTING);
    stepsim()
        .args(["--output", "json", "run"])
        .arg(&def)
        .args(["--verbose", "--input", r#"{"amount": 1}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("stateExecutions"));
}

#[test]
fn run_uses_mock_file() {
    let dir = TempDir::new().unwrap();
    let def = write(&dir, "charge.json", CHARGE);
    let mock = write(
        &dir,
        "mocks.yaml",
        "mocks:\n  - state: Charge\n    type: fixed\n    response:\n      receipt: r-1\n",
    );
    stepsim()
        .args(["--output", "json", "run"])
        .arg(&def)
        .arg("--mock")
        .arg(&mock)
        .assert()
        .success()
        .stdout(predicate::str::contains("r-1"));
}

#[test]
fn run_failure_exits_1() {
    let dir = TempDir::new().unwrap();
    let def = write(&dir, "charge.json", CHARGE);
    stepsim()
        .arg("run")
        .arg(&def)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("status: FAILED"))
        .stdout(predicate::str::contains("States.TaskFailed"));
}

#[test]
fn run_honors_max_steps_and_config() {
    let dir = TempDir::new().unwrap();
    let def = write(
        &dir,
        "loop.json",
        r#"{
          "StartAt": "Ping",
          "States": {
            "Ping": {"Type": "Pass", "Next": "Pong"},
            "Pong": {"Type": "Pass", "Next": "Ping"}
          }
        }"#,
    );
    let config = write(&dir, "engine.toml", "max_steps = 4\nexecution_name = \"cli-test\"\n");
    stepsim()
        .arg("run")
        .arg(&def)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("maximum of 4 steps"));
    stepsim()
        .arg("run")
        .arg(&def)
        .args(["--max-steps", "2"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("maximum of 2 steps"));
}

#[test]
fn run_rejects_bad_input_json() {
    let dir = TempDir::new().unwrap();
    let def = write(&dir, "routing.json", ROUTING);
    stepsim()
        .arg("run")
        .arg(&def)
        .args(["--input", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --input JSON"));
}
