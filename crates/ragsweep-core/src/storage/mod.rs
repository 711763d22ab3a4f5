//! Filesystem persistence of runs and experiments.
//!
//! A run file is written exactly once: writers open with `create_new` and
//! refuse to replace an existing file. Only the experiment summary, which is
//! derived, may be rewritten (see [`ResultsStore::resummarize_experiment`]).

pub mod naming;

use crate::config::EvalConfig;
use crate::errors::UnitStage;
use crate::metrics::{ExperimentRecord, RunMetrics};
use crate::model::EvaluationResult;
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// A unit that produced no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub test_case_id: String,
    pub stage: Option<UnitStage>,
    pub kind: String,
    pub message: String,
}

/// One execution of one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub config_snapshot: EvalConfig,
    pub metrics: RunMetrics,
    pub results: Vec<EvaluationResult>,
    pub failures: Vec<UnitFailure>,
}

/// On-disk shape of `runs/<run_id>/results.json`. The config lives next to
/// it as YAML.
#[derive(Serialize, Deserialize)]
struct RunResultsFile {
    run_id: String,
    timestamp: DateTime<Utc>,
    metrics: RunMetrics,
    results: Vec<EvaluationResult>,
    #[serde(default)]
    failures: Vec<UnitFailure>,
}

/// On-disk shape of `experiments/<id>/run_<n>_results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRunFile {
    pub run_number: usize,
    pub metrics: RunMetrics,
    pub results: Vec<EvaluationResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummaryFile {
    pub generated_at: DateTime<Utc>,
    pub aggregated_metrics: ExperimentRecord,
    pub run_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResultsStore {
    root: PathBuf,
}

impl ResultsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join(naming::RUNS_DIR)
    }

    pub fn experiment_dir(&self, experiment_id: &str) -> PathBuf {
        self.root
            .join(naming::EXPERIMENTS_DIR)
            .join(naming::sanitize_id(experiment_id))
    }

    /// Creates `path` (and parents) if missing. Returns `true` when it was
    /// created by this call.
    pub fn ensure_exists(path: &Path) -> anyhow::Result<bool> {
        if path.is_dir() {
            return Ok(false);
        }
        if path.exists() {
            bail!("{} exists and is not a directory", path.display());
        }
        fs::create_dir_all(path).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(true)
    }

    /// Single-run mode: `runs/<run_id>/{results.json,config.yaml}`.
    pub fn save_run(&self, record: &RunRecord) -> anyhow::Result<PathBuf> {
        let run_id = naming::sanitize_id(&record.run_id);
        let dir = self.runs_dir().join(&run_id);
        Self::ensure_exists(&dir)?;

        let file = RunResultsFile {
            run_id: record.run_id.clone(),
            timestamp: record.timestamp,
            metrics: record.metrics.clone(),
            results: record.results.clone(),
            failures: record.failures.clone(),
        };
        let results_path = dir.join(naming::RESULTS_FILE);
        write_new(&results_path, &to_json(&file)?)?;
        write_new(&dir.join(naming::CONFIG_FILE), &record.config_snapshot.to_yaml()?)?;
        info!(run_id = %record.run_id, path = %dir.display(), "saved run");
        Ok(dir)
    }

    pub fn load_run(&self, run_id: &str) -> anyhow::Result<RunRecord> {
        let dir = self.runs_dir().join(naming::sanitize_id(run_id));
        let results_path = dir.join(naming::RESULTS_FILE);
        let raw = fs::read_to_string(&results_path)
            .with_context(|| format!("failed to read {}", results_path.display()))?;
        let file: RunResultsFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", results_path.display()))?;
        let config_snapshot = EvalConfig::load(&dir.join(naming::CONFIG_FILE))?;
        Ok(RunRecord {
            run_id: file.run_id,
            timestamp: file.timestamp,
            config_snapshot,
            metrics: file.metrics,
            results: file.results,
            failures: file.failures,
        })
    }

    /// Run ids, most recent first. Derived from directory names only.
    pub fn list_runs(&self) -> anyhow::Result<Vec<String>> {
        let dir = self.runs_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("failed to list {}", dir.display()))? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if naming::is_run_id(name) {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    /// Multi-run mode. Creates the experiment directory and writes the
    /// config snapshot once; per-run files go through the returned writer.
    /// Resuming an experiment requires the same config as its snapshot.
    pub fn begin_experiment(&self, experiment_id: &str, config: &EvalConfig) -> anyhow::Result<ExperimentWriter> {
        let id = naming::sanitize_id(experiment_id);
        if id.is_empty() {
            bail!("experiment id must not be empty");
        }
        let dir = self.experiment_dir(&id);
        Self::ensure_exists(&dir)?;
        let config_path = dir.join(naming::CONFIG_FILE);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            let existing: EvalConfig = serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse {}", config_path.display()))?;
            if existing != *config {
                bail!(
                    "experiment '{id}' was started with a different config ({}); use a new experiment id",
                    config_path.display()
                );
            }
        } else {
            write_new(&config_path, &config.to_yaml()?)?;
        }
        info!(experiment_id = %id, path = %dir.display(), "experiment directory ready");
        Ok(ExperimentWriter {
            experiment_id: id,
            dir,
            run_files: Vec::new(),
        })
    }

    /// Per-run files of an experiment, ordered by run number.
    pub fn load_experiment_runs(&self, experiment_id: &str) -> anyhow::Result<Vec<ExperimentRunFile>> {
        let dir = self.experiment_dir(experiment_id);
        let mut numbered = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("failed to list {}", dir.display()))? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(n) = name.to_str().and_then(naming::parse_experiment_run_file) {
                numbered.push((n, entry.path()));
            }
        }
        numbered.sort_by_key(|(n, _)| *n);
        numbered
            .into_iter()
            .map(|(_, path)| {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
            })
            .collect()
    }

    /// Re-aggregates an experiment from its run files and rewrites the
    /// summary. Metrics are recomputed from the stored results.
    pub fn resummarize_experiment(&self, experiment_id: &str) -> anyhow::Result<Option<ExperimentRecord>> {
        let runs = self.load_experiment_runs(experiment_id)?;
        let writer = ExperimentWriter {
            experiment_id: naming::sanitize_id(experiment_id),
            dir: self.experiment_dir(experiment_id),
            run_files: runs
                .iter()
                .map(|r| naming::experiment_run_file(r.run_number))
                .collect(),
        };
        let metrics: Vec<RunMetrics> = runs.iter().map(|r| RunMetrics::compute(&r.results)).collect();
        let pooled: Vec<EvaluationResult> = runs.into_iter().flat_map(|r| r.results).collect();
        writer.save_summary(&metrics, &pooled)
    }

    pub fn load_experiment_summary(&self, experiment_id: &str) -> anyhow::Result<ExperimentSummaryFile> {
        let path = self
            .experiment_dir(experiment_id)
            .join(naming::EXPERIMENT_SUMMARY_FILE);
        let raw = fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// Writes the artifacts of one experiment directory.
#[derive(Debug)]
pub struct ExperimentWriter {
    experiment_id: String,
    dir: PathBuf,
    run_files: Vec<String>,
}

impl ExperimentWriter {
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_run(
        &mut self,
        run_number: usize,
        metrics: &RunMetrics,
        results: &[EvaluationResult],
    ) -> anyhow::Result<PathBuf> {
        let name = naming::experiment_run_file(run_number);
        let path = self.dir.join(&name);
        let file = ExperimentRunFile {
            run_number,
            metrics: metrics.clone(),
            results: results.to_vec(),
        };
        write_new(&path, &to_json(&file)?)?;
        self.run_files.push(name);
        info!(experiment_id = %self.experiment_id, run_number, path = %path.display(), "saved experiment run");
        Ok(path)
    }

    /// Writes `experiment_summary.json` when at least two runs are given.
    pub fn save_summary(
        &self,
        runs: &[RunMetrics],
        pooled: &[EvaluationResult],
    ) -> anyhow::Result<Option<ExperimentRecord>> {
        let Some(record) = ExperimentRecord::build(&self.experiment_id, runs, pooled) else {
            return Ok(None);
        };
        let summary = ExperimentSummaryFile {
            generated_at: Utc::now(),
            aggregated_metrics: record.clone(),
            run_files: self.run_files.clone(),
        };
        let path = self.dir.join(naming::EXPERIMENT_SUMMARY_FILE);
        fs::write(&path, to_json(&summary)?).with_context(|| format!("failed to write {}", path.display()))?;
        info!(experiment_id = %self.experiment_id, num_runs = runs.len(), path = %path.display(), "saved experiment summary");
        Ok(Some(record))
    }
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize artifact")
}

pub(crate) fn write_new(path: &Path, content: &str) -> anyhow::Result<()> {
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("refusing to overwrite or cannot create {}", path.display()))?;
    f.write_all(content.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
