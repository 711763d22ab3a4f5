//! Exit codes and output of the inspection commands against real artifacts.

use assert_cmd::Command;
use chrono::{TimeZone, Utc};
use predicates::prelude::*;
use ragsweep_core::config::EvalConfig;
use ragsweep_core::metrics::RunMetrics;
use ragsweep_core::model::EvaluationResult;
use ragsweep_core::storage::{naming, ResultsStore, RunRecord};
use std::fs;
use std::path::Path;

fn result(id: &str, correct: bool) -> EvaluationResult {
    EvaluationResult {
        test_case_id: id.into(),
        category: "temporal".into(),
        difficulty: "easy".into(),
        query: "q".into(),
        golden_answer: "a".into(),
        hypothesis: "a".into(),
        context_text: String::new(),
        context_token_count: 0,
        context_char_count: 0,
        retrieval_duration: 0.5,
        response_duration: 1.0,
        grading_duration: 0.25,
        total_duration: 2.0,
        is_correct: correct,
        correctness_reasoning: String::new(),
        completeness_grade: None,
        completeness_reasoning: String::new(),
        missing_elements: vec![],
        present_elements: vec![],
        summarization_applied: false,
    }
}

fn seed_run(root: &Path) -> String {
    let timestamp = Utc.with_ymd_and_hms(2024, 3, 2, 10, 30, 0).unwrap();
    let results = vec![result("a", true), result("b", true), result("c", false)];
    let record = RunRecord {
        run_id: naming::new_run_id(timestamp),
        timestamp,
        config_snapshot: EvalConfig::default(),
        metrics: RunMetrics::compute(&results),
        results,
        failures: vec![],
    };
    ResultsStore::new(root).save_run(&record).unwrap();
    record.run_id
}

fn ragsweep() -> Command {
    let mut cmd = Command::cargo_bin("ragsweep").unwrap();
    cmd.env_remove("RAGSWEEP_ROOT").env("RUST_LOG", "warn");
    cmd
}

#[test]
fn runs_list_and_show() {
    let tmp = tempfile::tempdir().unwrap();
    let run_id = seed_run(tmp.path());
    let root = tmp.path().to_str().unwrap();

    ragsweep()
        .args(["runs", "list", "--root", root])
        .assert()
        .success()
        .stdout(predicate::str::contains(run_id.as_str()))
        .stdout(predicate::str::contains("2024-03-02T10:30:00+00:00"));

    ragsweep()
        .args(["runs", "show", "--root", root, &run_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Accuracy: 66.7% (2/3)"))
        .stdout(predicate::str::contains("temporal"));

    let out = ragsweep()
        .args(["runs", "show", "--root", root, &run_id, "--format", "json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["metrics"]["correct_count"], 2);
    assert_eq!(v["run_id"], run_id.as_str());
}

#[test]
fn missing_run_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    ragsweep()
        .args(["runs", "show", "--root", tmp.path().to_str().unwrap(), "20240101T000000Z-deadbeef"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("fatal"));
}

#[test]
fn experiment_needs_two_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ResultsStore::new(tmp.path());
    let mut w = store.begin_experiment("exp", &EvalConfig::default()).unwrap();
    let results = vec![result("a", true), result("b", false)];
    w.save_run(1, &RunMetrics::compute(&results), &results).unwrap();
    let root = tmp.path().to_str().unwrap();

    ragsweep()
        .args(["experiment", "summarize", "--root", root, "exp"])
        .assert()
        .code(1);

    w.save_run(2, &RunMetrics::compute(&results), &results).unwrap();
    ragsweep()
        .args(["experiment", "summarize", "--root", root, "exp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Experiment exp (2 runs)"));
    assert!(store.load_experiment_summary("exp").is_ok());
}

#[test]
fn config_validate_exit_codes() {
    let tmp = tempfile::tempdir().unwrap();
    let good = tmp.path().join("good.yaml");
    fs::write(&good, "name: smoke\nconcurrency: 3\n").unwrap();
    let bad = tmp.path().join("bad.yaml");
    fs::write(&bad, "name: smoke\nconcurrency: 0\n").unwrap();
    let search = tmp.path().join("search.yaml");
    fs::write(
        &search,
        "space:\n  entity_limits: [5, 10]\n  fact_limits: [10]\n  rerankers: [rrf, mmr]\n  models: [m]\n",
    )
    .unwrap();

    ragsweep()
        .args(["config", "validate", good.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("smoke"));
    ragsweep()
        .args(["config", "validate", bad.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("concurrency"));
    ragsweep()
        .args(["config", "validate", search.to_str().unwrap(), "--kind", "search"])
        .assert()
        .success()
        .stdout(predicate::str::contains("4 grid points"));
    ragsweep()
        .args(["config", "validate", tmp.path().join("nope.yaml").to_str().unwrap()])
        .assert()
        .code(2);
}

#[test]
fn search_show_without_summary_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    ragsweep()
        .args(["search", "show", tmp.path().to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no search summary"));
}
