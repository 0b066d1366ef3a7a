//! CLI tests for the chunkstitch binary using the simulated codec

mod common;

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use common::write_chunk_files;

/// Binary invocation isolated from config files and environment overrides
fn chunkstitch(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("chunkstitch").unwrap();
    cmd.current_dir(dir)
        .env_remove("CHUNKSTITCH_CONFIG")
        .env_remove("CHUNKSTITCH_WRITE_POLICY")
        .env_remove("CHUNKSTITCH_CONCURRENCY")
        .env_remove("CHUNKSTITCH_FRAME_SIZE")
        .env_remove("RUST_LOG")
        .args(["--codec", "simulated", "--workspace"])
        .arg(dir.join("ws"));
    cmd
}

fn workspace_with_chunks(source: &str, n: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    let ws = dir.path().join("ws");
    std::fs::create_dir_all(&ws).unwrap();
    write_chunk_files(&ws, source, 5, n);
    dir
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    chunkstitch(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("decode"));
}

#[test]
fn test_run_writes_output_and_decodes_back() {
    let dir = workspace_with_chunks("clip", 4);
    let output = dir.path().join("ws").join("clip_output.ivf");

    chunkstitch(dir.path())
        .args(["run", "--source", "clip", "--chunks", "4", "-j", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Output:"))
        .stdout(predicate::str::contains("encGivenStateV1"));
    assert!(output.is_file());
    assert!(dir.path().join("ws").join("clip_final_03.ivf").is_file());

    chunkstitch(dir.path())
        .args(["decode", "--input"])
        .arg(&output)
        .arg("--output")
        .arg(dir.path().join("decoded.yuv"))
        .args(["--compare-source", "clip", "--chunks", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("matches"));

    chunkstitch(dir.path())
        .args(["status", "--source", "clip", "--chunks", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Complete"));
}

#[test]
fn test_status_before_run_names_first_stage() {
    let dir = workspace_with_chunks("clip", 2);
    chunkstitch(dir.path())
        .args(["status", "--source", "clip", "--chunks", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Next stage: vpx"));
}

#[test]
fn test_run_json_report_parses() {
    let dir = workspace_with_chunks("clip", 3);
    let assert = chunkstitch(dir.path())
        .args(["run", "--source", "clip", "--chunks", "3", "--json"])
        .assert()
        .success();

    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["source"], "clip");
    assert_eq!(report["chunk_count"], 3);
    assert_eq!(report["stages"].as_array().unwrap().len(), 6);
}

#[test]
fn test_strict_rerun_exits_with_ledger_code() {
    let dir = workspace_with_chunks("clip", 2);
    chunkstitch(dir.path())
        .args(["run", "--source", "clip", "--chunks", "2"])
        .assert()
        .success();

    chunkstitch(dir.path())
        .args(["run", "--source", "clip", "--chunks", "2", "--policy", "strict"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("Duplicate artifact"));
}

#[test]
fn test_missing_chunk_exits_with_split_code() {
    let dir = workspace_with_chunks("clip", 2);
    chunkstitch(dir.path())
        .args(["run", "--source", "clip", "--chunks", "3"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Split failed"));
}

#[test]
fn test_unknown_policy_is_config_error() {
    let dir = workspace_with_chunks("clip", 2);
    chunkstitch(dir.path())
        .args(["run", "--source", "clip", "--chunks", "2", "--policy", "sometimes"])
        .assert()
        .code(1);
}

#[test]
fn test_zero_chunks_is_config_error() {
    let dir = workspace_with_chunks("clip", 2);
    chunkstitch(dir.path())
        .args(["run", "--source", "clip", "--chunks", "0"])
        .assert()
        .code(1);
}

#[test]
fn test_batch_runs_every_source() {
    let dir = workspace_with_chunks("alpha", 3);
    write_chunk_files(&dir.path().join("ws"), "beta", 6, 2);

    chunkstitch(dir.path())
        .args(["batch", "-s", "alpha", "-s", "beta", "--chunks", "2"])
        .assert()
        .success();
    assert!(dir.path().join("ws").join("alpha_output.ivf").is_file());
    assert!(dir.path().join("ws").join("beta_output.ivf").is_file());
}
