//! CLI integration tests for sieve-curate.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a Command for the sieve-curate binary.
#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin("sieve-curate").unwrap()
}

fn dialogue_line(text: &str) -> String {
    serde_json::json!({
        "category": "dialogue",
        "input": text,
        "output": {"response": "Happy to help with that question."},
        "metadata": {"source": "chat-logs"}
    })
    .to_string()
}

fn write_dataset(path: &Path, n: usize) {
    let lines: Vec<String> = (0..n)
        .map(|i| dialogue_line(&format!("Can you help me with problem number {i}?")))
        .collect();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Dataset curation for supervised fine-tuning",
        ));
}

#[test]
fn test_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sieve-curate"));
}

#[test]
fn test_completions() {
    cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sieve-curate"));
}

// ============================================================================
// Argument Validation Tests
// ============================================================================

#[test]
fn test_missing_input() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file is required"));
}

#[test]
fn test_missing_out_dir() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("data.jsonl");
    write_dataset(&input, 5);

    cmd()
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("output directory required"));
}

#[test]
fn test_invalid_val_fraction_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("data.jsonl");
    let out = temp.path().join("out");
    write_dataset(&input, 5);

    cmd()
        .arg(&input)
        .arg("--out-dir")
        .arg(&out)
        .args(["--val-fraction", "1.5"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("val_fraction"));

    assert!(!out.exists());
}

#[test]
fn test_invalid_target_syntax() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("data.jsonl");
    write_dataset(&input, 5);

    cmd()
        .arg(&input)
        .args(["--out-dir", temp.path().to_str().unwrap()])
        .args(["--target", "poetry=10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown category"));
}

#[test]
fn test_json_input_that_is_not_an_array() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("data.json");
    fs::write(&input, r#"{"category": "dialogue"}"#).unwrap();

    cmd()
        .arg(&input)
        .args(["--out-dir", temp.path().join("out").to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("expected a JSON array"));
}

// ============================================================================
// Curation Tests
// ============================================================================

#[test]
fn test_basic_run_writes_artifacts() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("data.jsonl");
    let out = temp.path().join("out");
    write_dataset(&input, 40);

    cmd()
        .arg(&input)
        .arg("--out-dir")
        .arg(&out)
        .args(["--val-fraction", "0.25"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Curation Results"))
        .stderr(predicate::str::contains("Status:"));

    let train = fs::read_to_string(out.join("train.jsonl")).unwrap();
    let val = fs::read_to_string(out.join("val.jsonl")).unwrap();
    assert_eq!(train.lines().count(), 30);
    assert_eq!(val.lines().count(), 10);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("report.json")).unwrap()).unwrap();
    assert_eq!(report["status"], "ready");
    assert_eq!(report["split"]["leakage_groups"], 0);
}

#[test]
fn test_json_output() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("data.jsonl");
    write_dataset(&input, 20);

    let output = cmd()
        .arg(&input)
        .args(["--out-dir", temp.path().join("out").to_str().unwrap()])
        .args(["--val-fraction", "0.1", "--json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["input_records"], 20);
    assert_eq!(report["categories"]["dialogue"]["accepted"], 20);
}

#[test]
fn test_stats_only_skips_partitions() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("data.jsonl");
    let out = temp.path().join("out");
    write_dataset(&input, 10);

    cmd()
        .arg(&input)
        .arg("--out-dir")
        .arg(&out)
        .arg("--stats-only")
        .assert()
        .success()
        .stderr(predicate::str::contains("--stats-only"));

    assert!(out.join("report.json").exists());
    assert!(!out.join("train.jsonl").exists());
}

#[test]
fn test_empty_input_is_not_ready() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("empty.jsonl");
    let out = temp.path().join("out");
    fs::write(&input, "").unwrap();

    cmd()
        .arg(&input)
        .arg("--out-dir")
        .arg(&out)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not_ready"));

    assert!(out.join("report.json").exists());
}

#[test]
fn test_shortfall_with_source_is_ready_with_warnings() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("data.jsonl");
    let extra = temp.path().join("extra.jsonl");
    let out = temp.path().join("out");
    write_dataset(&input, 20);
    let extra_lines: Vec<String> = (0..5)
        .map(|i| dialogue_line(&format!("Another question from the extra pool, item {i}")))
        .collect();
    fs::write(&extra, extra_lines.join("\n")).unwrap();

    cmd()
        .arg(&input)
        .arg("--out-dir")
        .arg(&out)
        .args(["--val-fraction", "0.2", "--target", "dialogue=30"])
        .arg("--source")
        .arg(format!("extra={}", extra.display()))
        .assert()
        .success()
        .stderr(predicate::str::contains("ready_with_warnings"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("report.json")).unwrap()).unwrap();
    assert_eq!(report["categories"]["dialogue"]["accepted"], 25);
    assert_eq!(report["categories"]["dialogue"]["shortfall"], 5);
    assert_eq!(report["balance"]["categories"]["dialogue"]["stop_reason"], "sources_exhausted");
    assert_eq!(report["sources"]["extra"]["balance_added"], 5);
}

#[test]
fn test_missing_source_file_is_reported_not_fatal() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("data.jsonl");
    let out = temp.path().join("out");
    write_dataset(&input, 20);

    cmd()
        .arg(&input)
        .arg("--out-dir")
        .arg(&out)
        .args(["--val-fraction", "0.2", "--target", "dialogue=25"])
        .args(["--source", "ghost=/nonexistent/ghost.jsonl"])
        .assert()
        .success();

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("report.json")).unwrap()).unwrap();
    assert_eq!(report["status"], "ready_with_warnings");
    assert_eq!(report["balance"]["failed_sources"][0], "ghost");
}

#[test]
fn test_report_written_when_partition_write_fails() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("data.jsonl");
    let out = temp.path().join("out");
    write_dataset(&input, 20);
    // A directory where train.jsonl should go makes the partition write fail.
    fs::create_dir_all(out.join("train.jsonl")).unwrap();

    cmd()
        .arg(&input)
        .arg("--out-dir")
        .arg(&out)
        .args(["--val-fraction", "0.2"])
        .assert()
        .failure();

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("report.json")).unwrap()).unwrap();
    assert_eq!(report["split"]["val_records"], 4);
}
