use assert_cmd::Command;
use predicates::prelude::*;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn ctgcond() -> Command {
    Command::cargo_bin("ctgcond").unwrap()
}

/// Six-minute 4 Hz recording with a short dropout and a UC channel.
fn write_recording(dir: &Path, name: &str) -> PathBuf {
    let mut csv = String::from("# synthetic\ntime,fhr,uc\n");
    for i in 0..6 * 240 {
        let t = i as f64 / 4.0;
        let fhr = if (400..420).contains(&i) {
            0.0
        } else if i % 2 == 0 {
            139.0
        } else {
            141.0
        };
        let uc = 20.0 + 10.0 * (t / 30.0).sin();
        writeln!(csv, "{:.2},{},{:.3}", t, fhr, uc).unwrap();
    }
    let path = dir.join(name);
    std::fs::write(&path, csv).unwrap();
    path
}

fn write_unparseable(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, "# exported without data\ntime,fhr,uc\n").unwrap();
    path
}

fn write_dropout_only(dir: &Path, name: &str) -> PathBuf {
    let mut csv = String::new();
    for i in 0..100 {
        writeln!(csv, "{:.2},0", i as f64 / 4.0).unwrap();
    }
    let path = dir.join(name);
    std::fs::write(&path, csv).unwrap();
    path
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    ctgcond()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    ctgcond()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ctgcond"));
}

// =============================================================================
// VALIDATE SUBCOMMAND
// =============================================================================

#[test]
fn test_validate_missing_file() {
    ctgcond()
        .args(["validate", "--file", "/nonexistent/rec.csv"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_validate_json_reports_inferred_rate() {
    let dir = TempDir::new().unwrap();
    let path = write_recording(dir.path(), "rec.csv");
    let output = ctgcond()
        .args(["validate", "--json", "--file", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["valid"], true);
    assert_eq!(json["samples"], 1440);
    assert_eq!(json["sample_rate"], 4.0);
    assert_eq!(json["has_uc"], true);
}

// =============================================================================
// PROCESS SUBCOMMAND
// =============================================================================

#[test]
fn test_process_writes_report() {
    let dir = TempDir::new().unwrap();
    let path = write_recording(dir.path(), "rec.csv");
    let out = dir.path().join("out.json");

    ctgcond()
        .args([
            "process",
            "--quiet",
            "--include-points",
            "--file",
            path.to_str().unwrap(),
            "--output",
            out.to_str().unwrap(),
        ])
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert!(json["id"].is_string());
    assert!(json["created_at"].is_string());
    let result = &json["result"];
    let n = result["estimated_hr"].as_array().unwrap().len();
    assert_eq!(n, 1440);
    assert_eq!(result["mask"].as_array().unwrap().len(), n);
    assert_eq!(result["baseline"]["values"].as_array().unwrap().len(), n);
    assert_eq!(result["bands"]["slow"].as_array().unwrap().len(), n);
    assert_eq!(result["uc_trend"].as_array().unwrap().len(), n);
    assert!(result["baseline"]["points"].is_array());
    assert_eq!(result["baseline"]["quality"], "normal");
}

#[test]
fn test_process_rejects_bad_config() {
    let dir = TempDir::new().unwrap();
    let path = write_recording(dir.path(), "rec.csv");
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{"baseline": {"min_valid_fraction": 3.0}}"#).unwrap();

    ctgcond()
        .args([
            "process",
            "--file",
            path.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("min_valid_fraction"));
}

#[test]
fn test_process_unusable_recording_is_degraded() {
    let dir = TempDir::new().unwrap();
    let path = write_dropout_only(dir.path(), "empty.csv");
    let output = ctgcond()
        .args(["process", "--quiet", "--compact", "--file", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let kinds: Vec<&str> = json["result"]["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["no_reference_window", "insufficient_data"]);
    assert_eq!(json["result"]["baseline"]["quality"], "fallback");
}

#[test]
fn test_process_decimate() {
    let dir = TempDir::new().unwrap();
    let path = write_recording(dir.path(), "rec.csv");
    let output = ctgcond()
        .args([
            "process",
            "--quiet",
            "--decimate",
            "4",
            "--file",
            path.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["source_sample_rate"], 4.0);
    assert_eq!(json["result"]["sample_rate"], 1.0);
    assert_eq!(json["result"]["estimated_hr"].as_array().unwrap().len(), 360);
    assert_eq!(json["result"]["uc_trend"].as_array().unwrap().len(), 360);
}

// =============================================================================
// BATCH SUBCOMMAND
// =============================================================================

#[test]
fn test_batch_dry_run_lists_files() {
    let dir = TempDir::new().unwrap();
    write_recording(dir.path(), "a.csv");
    write_recording(dir.path(), "b.csv");
    let pattern = format!("{}/*.csv", dir.path().display());

    ctgcond()
        .args(["batch", "--dry-run", "--glob", &pattern])
        .assert()
        .success()
        .stdout(predicate::str::contains("a.csv"))
        .stdout(predicate::str::contains("b.csv"));
}

#[test]
fn test_batch_requires_input_selection() {
    ctgcond().args(["batch"]).assert().code(1);
}

#[test]
fn test_batch_partial_failure_continues() {
    let dir = TempDir::new().unwrap();
    let good = write_recording(dir.path(), "good.csv");
    let bad = write_unparseable(dir.path(), "bad.csv");
    let out_dir = dir.path().join("out");

    ctgcond()
        .args([
            "batch",
            "--jobs",
            "2",
            "--files",
            good.to_str().unwrap(),
            bad.to_str().unwrap(),
            "--output-dir",
            out_dir.to_str().unwrap(),
        ])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("1/2 succeeded"));

    assert!(out_dir.join("good_conditioned.json").is_file());
    assert!(!out_dir.join("bad_conditioned.json").exists());
}

#[test]
fn test_batch_jsonl_to_stdout() {
    let dir = TempDir::new().unwrap();
    write_recording(dir.path(), "a.csv");
    write_recording(dir.path(), "b.csv");
    let pattern = format!("{}/*.csv", dir.path().display());

    let output = ctgcond()
        .args(["batch", "--quiet", "--glob", &pattern])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert!(first["source"].as_str().unwrap().ends_with("a.csv"));
    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_ne!(first["id"], second["id"]);
}
