use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn data_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join(name)
}

#[test]
fn rao_run_writes_reports() {
    let out_dir = tempdir().unwrap();
    let out = out_dir.path().join("result.json");
    let case = data_path("two_perimeters.json");
    let params = data_path("params.toml");
    let mut cmd = Command::cargo_bin("rao").unwrap();
    cmd.args([
        "run",
        "--case",
        case.to_str().unwrap(),
        "--params",
        params.to_str().unwrap(),
        "--threads",
        "2",
        "-o",
        out.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("co-1 - curative"))
    .stdout(predicate::str::contains("open-cur"))
    .stdout(predicate::str::contains("Overall: secure"));

    let reports: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["perimeter"], "preventive");
    assert_eq!(reports[1]["discrete_actions"][0], "open-cur");
}

#[test]
fn rao_perimeters_lists_partition() {
    let case = data_path("two_perimeters.json");
    let mut cmd = Command::cargo_bin("rao").unwrap();
    cmd.args(["perimeters", "--case", case.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("co-1 - outage"))
        .stdout(predicate::str::contains("Operators without curative remedial actions: FR, NL"));
}

#[test]
fn rao_run_rejects_missing_case() {
    let mut cmd = Command::cargo_bin("rao").unwrap();
    cmd.args(["run", "--case", "does-not-exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading case file"));
}

#[test]
fn rao_run_rejects_unknown_stop_criterion() {
    let dir = tempdir().unwrap();
    let params = dir.path().join("params.toml");
    fs::write(
        &params,
        "[objective_function]\npreventive_stop_criterion = \"WHENEVER\"\n",
    )
    .unwrap();
    let case = data_path("two_perimeters.json");
    let mut cmd = Command::cargo_bin("rao").unwrap();
    cmd.args([
        "run",
        "--case",
        case.to_str().unwrap(),
        "--params",
        params.to_str().unwrap(),
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("loading parameters"));
}

#[test]
fn rao_run_rejects_bad_thread_count() {
    let case = data_path("two_perimeters.json");
    let mut cmd = Command::cargo_bin("rao").unwrap();
    cmd.args(["run", "--case", case.to_str().unwrap(), "--threads", "zero"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid thread count"));
}
