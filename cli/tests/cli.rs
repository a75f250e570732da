#![expect(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn missing_required_data_flag_is_rejected() {
    Command::cargo_bin("analysis")
        .expect("binary builds")
        .arg("what is the trend?")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--data"));
}

#[test]
fn missing_query_is_rejected() {
    Command::cargo_bin("analysis")
        .expect("binary builds")
        .args(["--data", "nonexistent.csv"])
        .assert()
        .failure();
}

#[test]
fn nonexistent_dataset_file_reports_a_readable_error_before_touching_the_network() {
    Command::cargo_bin("analysis")
        .expect("binary builds")
        .args(["some question", "--data", "/nonexistent/path/does-not-exist.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read dataset"));
}
