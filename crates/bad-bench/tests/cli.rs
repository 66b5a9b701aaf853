use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const CONFIG: &str = r#"
run_id: "cli_check"
experiment:
  experiment: risky
  max_trials: 2
  model:
    kind: risky_hyperbolic
    particles: 200
simulation:
  participants: 1
outputs:
  summary_json: "out/{run_id}/summary.json"
  summary_md: "out/{run_id}/summary.md"
"#;

#[test]
fn validate_only_reports_the_configuration() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("bench.yaml");
    fs::write(&path, CONFIG).expect("write config");

    Command::cargo_bin("bad-bench")
        .expect("binary built")
        .current_dir(dir.path())
        .arg("--config")
        .arg(&path)
        .args(["--participants", "4", "--validate-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded configuration 'cli_check'"))
        .stdout(predicate::str::contains("risky_hyperbolic model, 4 participants"))
        .stdout(predicate::str::contains("simulation skipped"));

    assert!(!dir.path().join("out").exists());
}

#[test]
fn incompatible_model_is_rejected() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("bench.yaml");
    fs::write(&path, CONFIG.replace("kind: risky_hyperbolic", "kind: hyperbolic"))
        .expect("write config");

    Command::cargo_bin("bad-bench")
        .expect("binary built")
        .arg("--config")
        .arg(&path)
        .arg("--validate-only")
        .assert()
        .failure()
        .stderr(predicate::str::contains("experiment.model.kind"));
}

#[test]
fn missing_config_fails_with_its_path() {
    Command::cargo_bin("bad-bench")
        .expect("binary built")
        .args(["--config", "no/such/bench.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config"))
        .stderr(predicate::str::contains("no/such/bench.yaml"));
}

#[test]
fn full_run_writes_both_summaries() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("bench.yaml");
    fs::write(&path, CONFIG).expect("write config");

    Command::cargo_bin("bad-bench")
        .expect("binary built")
        .current_dir(dir.path())
        .arg("--config")
        .arg(&path)
        .args(["--run-id", "renamed", "--seed", "3", "--trials", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 participants, 3 trials"));

    let out = dir.path().join("out").join("renamed");
    assert!(out.join("summary.json").exists());
    let markdown = fs::read_to_string(out.join("summary.md")).expect("markdown written");
    assert!(markdown.contains("# Parameter Recovery: renamed"));
    assert!(markdown.contains("| logh |"));
}
