//! Configuration of a hyperparameter sweep.

use crate::errors::ConfigError;
use crate::search::space::SearchSpace;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_output_dir() -> PathBuf {
    PathBuf::from("search_results")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub space: SearchSpace,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub bayesian: BayesianConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Configurations evaluated at once. Composes multiplicatively with the
    /// per-run `concurrency` of the base config.
    #[serde(default = "GridConfig::default_trial_concurrency")]
    pub trial_concurrency: usize,
}

impl GridConfig {
    fn default_trial_concurrency() -> usize {
        2
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            trial_concurrency: Self::default_trial_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    Random,
    /// Density-based (categorical Parzen estimators).
    #[default]
    Tpe,
    /// Depth-one regression trees per parameter.
    Tree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrunerKind {
    None,
    #[default]
    Median,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrunerConfig {
    #[serde(default)]
    pub kind: PrunerKind,
    /// Completed trials required before pruning is considered.
    #[serde(default = "PrunerConfig::default_startup")]
    pub n_startup_trials: usize,
    /// Batches a trial must report before it can be pruned.
    #[serde(default = "PrunerConfig::default_warmup")]
    pub n_warmup_steps: usize,
}

impl PrunerConfig {
    fn default_startup() -> usize {
        5
    }
    fn default_warmup() -> usize {
        1
    }
}

impl Default for PrunerConfig {
    fn default() -> Self {
        Self {
            kind: PrunerKind::Median,
            n_startup_trials: Self::default_startup(),
            n_warmup_steps: Self::default_warmup(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianConfig {
    #[serde(default = "BayesianConfig::default_n_trials")]
    pub n_trials: usize,
    /// Test cases per intermediate report.
    #[serde(default = "BayesianConfig::default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub sampler: SamplerKind,
    /// Random trials before a model-based sampler takes over. `None` keeps
    /// the sampler's own default.
    #[serde(default)]
    pub sampler_startup_trials: Option<usize>,
    #[serde(default = "BayesianConfig::default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub pruner: PrunerConfig,
}

impl BayesianConfig {
    fn default_n_trials() -> usize {
        20
    }
    fn default_batch_size() -> usize {
        10
    }
    fn default_seed() -> u64 {
        42
    }
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            n_trials: Self::default_n_trials(),
            batch_size: Self::default_batch_size(),
            sampler: SamplerKind::default(),
            sampler_startup_trials: None,
            seed: Self::default_seed(),
            pruner: PrunerConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn new(output_dir: impl Into<PathBuf>, space: SearchSpace) -> Self {
        Self {
            output_dir: output_dir.into(),
            space,
            grid: GridConfig::default(),
            bayesian: BayesianConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.space.validate()?;
        if self.grid.trial_concurrency == 0 {
            return Err(ConfigError::invalid("grid.trial_concurrency", "must be >= 1"));
        }
        if self.bayesian.n_trials == 0 {
            return Err(ConfigError::invalid("bayesian.n_trials", "must be >= 1"));
        }
        if self.bayesian.batch_size == 0 {
            return Err(ConfigError::invalid("bayesian.batch_size", "must be >= 1"));
        }
        Ok(())
    }

    pub fn from_yaml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: SearchConfig = serde_yaml::from_str(s).context("failed to parse search config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read search config: {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("invalid search config: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RerankerKind;

    const YAML: &str = r#"
output_dir: out/sweep
space:
  entity_limits: [5, 10]
  fact_limits: [10, 20, 30]
  rerankers: [rrf, cross_encoder]
  models: [gpt-4o-mini]
grid:
  trial_concurrency: 3
bayesian:
  n_trials: 8
  sampler: tree
  sampler_startup_trials: 4
  pruner: { kind: median, n_startup_trials: 2 }
"#;

    #[test]
    fn parses_with_defaults() {
        let cfg = SearchConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(cfg.grid.trial_concurrency, 3);
        assert_eq!(cfg.bayesian.sampler, SamplerKind::Tree);
        assert_eq!(cfg.bayesian.batch_size, 10);
        assert_eq!(cfg.bayesian.sampler_startup_trials, Some(4));
        assert_eq!(cfg.bayesian.pruner.n_startup_trials, 2);
        assert_eq!(cfg.bayesian.pruner.n_warmup_steps, 1);
        assert_eq!(cfg.space.rerankers, vec![RerankerKind::Rrf, RerankerKind::CrossEncoder]);
        assert_eq!(cfg.space.cardinalities(), vec![2, 3, 2, 1, 1, 1]);
    }

    #[test]
    fn rejects_zero_trial_concurrency() {
        let yaml = YAML.replace("trial_concurrency: 3", "trial_concurrency: 0");
        assert!(SearchConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn rejects_empty_value_list() {
        let yaml = YAML.replace("models: [gpt-4o-mini]", "models: []");
        assert!(SearchConfig::from_yaml_str(&yaml).is_err());
    }
}
