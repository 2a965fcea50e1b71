//! CLI integration tests for all subcommands.
//!
//! Uses `assert_cmd` to spawn the `scl` binary and verify exit codes,
//! stdout content and stderr content. Programs are written to a temp dir
//! which is also the working directory, so no stray `scl.toml` is read.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn scl(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("scl");
    cmd.current_dir(dir.path());
    cmd.env_remove("RUST_LOG");
    cmd
}

fn program(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    path
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    let dir = TempDir::new().unwrap();
    scl(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("SCL scripting language toolchain"));
}

#[test]
fn version_exits_0() {
    let dir = TempDir::new().unwrap();
    scl(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("scl"));
}

// ──────────────────────────────────────────────
// 2. Run
// ──────────────────────────────────────────────

#[test]
fn run_prints_to_stdout() {
    let dir = TempDir::new().unwrap();
    let file = program(&dir, "hello.scl", "- <name> = 'World'\n- Print (StringJoin ['Hello, ', <name>])");
    scl(&dir)
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello, World"));
}

#[test]
fn run_failure_exits_1_with_error() {
    let dir = TempDir::new().unwrap();
    let file = program(&dir, "div.scl", "Print (10 / 0)");
    scl(&dir)
        .arg("run")
        .arg(&file)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Attempt to Divide by Zero"));
}

#[test]
fn run_missing_file_exits_1() {
    let dir = TempDir::new().unwrap();
    scl(&dir)
        .args(["run", "nope.scl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error reading file"));
}

#[test]
fn run_json_errors() {
    let dir = TempDir::new().unwrap();
    let file = program(&dir, "bad.scl", "Print <missing>");
    let output = scl(&dir)
        .args(["--output", "json", "run"])
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    let errors = json["errors"].as_array().unwrap();
    assert!(!errors.is_empty());
    assert!(errors[0].as_str().unwrap().contains("<missing>"));
}

// ──────────────────────────────────────────────
// 3. Check
// ──────────────────────────────────────────────

#[test]
fn check_valid_program() {
    let dir = TempDir::new().unwrap();
    let file = program(&dir, "ok.scl", "Print (1 + 2)");
    scl(&dir)
        .arg("check")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
}

#[test]
fn check_reports_wrong_type() {
    let dir = TempDir::new().unwrap();
    let file = program(&dir, "wrong.scl", "Print (StringLength 42)");
    scl(&dir)
        .arg("check")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("StringLength"));
}

#[test]
fn check_reads_connectors_from_settings() {
    let dir = TempDir::new().unwrap();
    let file = program(&dir, "ok.scl", "Print 1");
    fs::write(dir.path().join("scl.toml"), "[connectors.FileSystem]\nversion = \"1.0.0\"\n").unwrap();
    scl(&dir).arg("check").arg(&file).assert().success();

    fs::write(dir.path().join("broken.toml"), "connectors = 3").unwrap();
    scl(&dir)
        .args(["--settings", "broken.toml", "check"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.toml"));
}

// ──────────────────────────────────────────────
// 4. Format
// ──────────────────────────────────────────────

#[test]
fn format_prints_canonical_text() {
    let dir = TempDir::new().unwrap();
    let file = program(&dir, "fmt.scl", "print   123");
    scl(&dir)
        .arg("format")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Print Value: 123"));
}

#[test]
fn format_rejects_syntax_errors() {
    let dir = TempDir::new().unwrap();
    let file = program(&dir, "broken.scl", "Print (1");
    scl(&dir).arg("format").arg(&file).assert().failure().code(1);
}

// ──────────────────────────────────────────────
// 5. Steps
// ──────────────────────────────────────────────

#[test]
fn steps_lists_signatures() {
    let dir = TempDir::new().unwrap();
    scl(&dir)
        .args(["steps", "arraymap"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ArrayMap Array: Array<T> Function: T => U -> Array<U>"));
}

#[test]
fn steps_json() {
    let dir = TempDir::new().unwrap();
    let output = scl(&dir).args(["--output", "json", "steps"]).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"SchemaValidate"));
    assert!(names.contains(&"EntityCombine"));
}
