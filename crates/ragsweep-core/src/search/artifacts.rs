//! On-disk layout of one sweep:
//!
//! ```text
//! <output_dir>/<search_id>/
//!   trial_000_<slug>/config.json
//!   trial_000_<slug>/trial_summary.json
//!   ...
//!   grid_search_summary.json | bayesian_search_summary.json
//! ```

use super::bayes::BayesianSummary;
use super::grid::GridSummary;
use super::space::TrialConfig;
use super::trial::TrialResult;
use crate::storage::{naming, to_json, write_new, ResultsStore};
use anyhow::{bail, Context};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const TRIAL_CONFIG_FILE: &str = "config.json";
pub const TRIAL_SUMMARY_FILE: &str = "trial_summary.json";
pub const GRID_SUMMARY_FILE: &str = "grid_search_summary.json";
pub const BAYESIAN_SUMMARY_FILE: &str = "bayesian_search_summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Grid,
    Bayesian,
}

impl SearchKind {
    pub fn summary_file(self) -> &'static str {
        match self {
            Self::Grid => GRID_SUMMARY_FILE,
            Self::Bayesian => BAYESIAN_SUMMARY_FILE,
        }
    }
}

/// `trial_<nnn>_<slug>/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialConfigFile {
    pub trial_number: usize,
    pub fingerprint: String,
    pub config: TrialConfig,
}

/// Summary of a finished sweep, whichever strategy produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchSummary {
    Grid(GridSummary),
    Bayesian(BayesianSummary),
}

pub fn trial_dir_name(trial_number: usize, config: &TrialConfig) -> String {
    format!("trial_{trial_number:03}_{}", config.slug())
}

#[derive(Debug, Clone)]
pub struct SearchArtifacts {
    search_id: String,
    dir: PathBuf,
}

impl SearchArtifacts {
    /// Creates a fresh `<output_dir>/<search_id>` directory.
    pub fn create(output_dir: &Path) -> anyhow::Result<Self> {
        let search_id = naming::new_run_id(Utc::now());
        let dir = output_dir.join(&search_id);
        if !ResultsStore::ensure_exists(&dir)? {
            bail!("search directory {} already exists", dir.display());
        }
        Ok(Self { search_id, dir })
    }

    pub fn search_id(&self) -> &str {
        &self.search_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the config and summary files of one finished trial.
    pub fn write_trial(&self, trial: &TrialResult) -> anyhow::Result<PathBuf> {
        let dir = self.dir.join(trial_dir_name(trial.trial_number, &trial.config));
        ResultsStore::ensure_exists(&dir)?;
        let config = TrialConfigFile {
            trial_number: trial.trial_number,
            fingerprint: trial.fingerprint.clone(),
            config: trial.config.clone(),
        };
        write_new(&dir.join(TRIAL_CONFIG_FILE), &to_json(&config)?)?;
        write_new(&dir.join(TRIAL_SUMMARY_FILE), &to_json(trial)?)?;
        info!(trial = trial.trial_number, state = %trial.state, path = %dir.display(), "saved trial");
        Ok(dir)
    }

    pub fn write_grid_summary(&self, summary: &GridSummary) -> anyhow::Result<PathBuf> {
        self.write_summary(SearchKind::Grid, to_json(summary)?)
    }

    pub fn write_bayesian_summary(&self, summary: &BayesianSummary) -> anyhow::Result<PathBuf> {
        self.write_summary(SearchKind::Bayesian, to_json(summary)?)
    }

    fn write_summary(&self, kind: SearchKind, json: String) -> anyhow::Result<PathBuf> {
        let path = self.dir.join(kind.summary_file());
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!(search_id = %self.search_id, path = %path.display(), "saved search summary");
        Ok(path)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Loads whichever top-level summary `dir` holds.
pub fn load_search_summary(dir: &Path) -> anyhow::Result<SearchSummary> {
    let grid = dir.join(GRID_SUMMARY_FILE);
    if grid.is_file() {
        return Ok(SearchSummary::Grid(read_json(&grid)?));
    }
    let bayes = dir.join(BAYESIAN_SUMMARY_FILE);
    if bayes.is_file() {
        return Ok(SearchSummary::Bayesian(read_json(&bayes)?));
    }
    bail!("no search summary in {}", dir.display())
}

/// Every `trial_*/trial_summary.json` under `dir`, by trial number.
pub fn load_trials(dir: &Path) -> anyhow::Result<Vec<TrialResult>> {
    let entries = fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    let mut trials = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_trial = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("trial_"));
        let summary = path.join(TRIAL_SUMMARY_FILE);
        if is_trial && summary.is_file() {
            trials.push(read_json::<TrialResult>(&summary)?);
        }
    }
    trials.sort_by_key(|t| t.trial_number);
    Ok(trials)
}
