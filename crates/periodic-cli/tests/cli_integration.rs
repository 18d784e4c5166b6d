use assert_cmd::Command;
use predicates::prelude::*;

fn periodic_demo() -> Command {
    Command::cargo_bin("periodic-demo").unwrap()
}

#[test]
fn test_help() {
    periodic_demo()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("periodic task engine"))
        .stdout(predicate::str::contains("--duration"))
        .stdout(predicate::str::contains("--executor"));
}

#[test]
fn test_version() {
    periodic_demo()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("periodic-demo"));
}

#[test]
fn test_unknown_strategy_is_rejected() {
    periodic_demo()
        .arg("--duration")
        .arg("1")
        .arg("--strategy")
        .arg("not-a-real-strategy")
        .assert()
        .failure();
}

#[test]
fn test_sync_executor_runs_and_reports_stats() {
    periodic_demo()
        .arg("--duration")
        .arg("2")
        .arg("--executor")
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("heartbeat"))
        .stdout(predicate::str::contains("sweep"));
}

#[test]
fn test_thread_pool_executor_runs_and_reports_stats() {
    periodic_demo()
        .arg("--duration")
        .arg("2")
        .arg("--executor")
        .arg("thread-pool")
        .assert()
        .success()
        .stdout(predicate::str::contains("heartbeat"))
        .stdout(predicate::str::contains("sweep"));
}
