use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn runner() -> Command {
    Command::cargo_bin("telemetry-runner").unwrap()
}

#[test]
fn cli_version() {
    runner()
        .arg("-V")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cli_rejects_zero_workers() {
    runner()
        .args(&["--workers", "0", "--duration-ms", "100"])
        .assert()
        .failure();
}

#[test]
fn cli_rejects_unparsable_workers() {
    runner().args(&["--workers", "many"]).assert().failure();
}

#[test]
fn cli_runs_until_duration() {
    runner()
        .args(&["--workers", "3", "--robots", "1", "--interval-ms", "50"])
        .args(&["--duration-ms", "300"])
        .assert()
        .success()
        .stdout(contains("errors: 0"));
}

#[test]
fn cli_critical_failure_stops_pool() {
    runner()
        .args(&["--workers", "3", "--robots", "1", "--interval-ms", "50"])
        .args(&["--duration-ms", "10000", "--fail-critical"])
        .assert()
        .failure()
        .stdout(contains("critical: command subscription: subscription rejected by broker"));
}

#[test]
fn cli_reads_config_file() {
    let dir = TempDir::new().expect("unable to create temporary working directory");
    let path = dir.path().join("pool.json");
    fs::write(&path, r#"{ "workers": 2, "backoff_unit_ms": 10 }"#).unwrap();

    runner()
        .arg("--config")
        .arg(&path)
        .args(&["--robots", "1", "--interval-ms", "50", "--duration-ms", "500"])
        .assert()
        .success()
        .stdout(contains("errors: 0"));
}

#[test]
fn cli_rejects_missing_config_file() {
    let dir = TempDir::new().expect("unable to create temporary working directory");
    runner()
        .arg("--config")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure();
}
