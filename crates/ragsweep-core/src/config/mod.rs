//! Typed run configuration.
//!
//! Every field has a documented default; `validate` is called by the loaders
//! and by `EvaluationRunner::new`, so an invalid config never reaches a run.

pub mod search;

use crate::engine::retry::RetryPolicy;
use crate::errors::ConfigError;
use crate::model::{RerankerKind, Scope, SummarizationStrategy};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

pub use search::{BayesianConfig, GridConfig, PrunerConfig, PrunerKind, SamplerKind, SearchConfig};

pub const CONFIG_VERSION: u32 = 1;

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_name() -> String {
    "eval".to_string()
}
fn default_concurrency() -> usize {
    5
}
fn default_overfetch() -> usize {
    3
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_name")]
    pub name: String,
    /// Max test cases evaluated at once within one run.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Skip retrieval entirely and answer with an empty context.
    #[serde(default)]
    pub baseline: bool,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub grading: GradingConfig,
    #[serde(default)]
    pub summarization: SummarizationStrategy,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            name: default_name(),
            concurrency: default_concurrency(),
            baseline: false,
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            grading: GradingConfig::default(),
            summarization: SummarizationStrategy::None,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Multiplier applied to a scope's limit when the reranker has to run locally.
    #[serde(default = "default_overfetch")]
    pub overfetch_factor: usize,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<ScopeConfig>,
}

fn default_scopes() -> Vec<ScopeConfig> {
    vec![
        ScopeConfig {
            scope: Scope::Entities,
            limit: 10,
            reranker: RerankerKind::Rrf,
        },
        ScopeConfig {
            scope: Scope::Facts,
            limit: 20,
            reranker: RerankerKind::Rrf,
        },
    ]
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: default_overfetch(),
            scopes: default_scopes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub scope: Scope,
    pub limit: usize,
    #[serde(default)]
    pub reranker: RerankerKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Grade context completeness alongside answer generation.
    #[serde(default = "default_true")]
    pub completeness: bool,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            completeness: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "RetryConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "RetryConfig::default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "RetryConfig::default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "RetryConfig::default_multiplier")]
    pub multiplier: f64,
}

impl RetryConfig {
    fn default_max_attempts() -> u32 {
        4
    }
    fn default_initial_delay_ms() -> u64 {
        1_000
    }
    fn default_max_delay_ms() -> u64 {
        30_000
    }
    fn default_multiplier() -> f64 {
        2.0
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            initial_delay_ms: Self::default_initial_delay_ms(),
            max_delay_ms: Self::default_max_delay_ms(),
            multiplier: Self::default_multiplier(),
        }
    }
}

impl EvalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::invalid(
                "version",
                format!("unsupported version {} (expected {})", self.version, CONFIG_VERSION),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::empty("name"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "must be >= 1"));
        }
        if self.retrieval.overfetch_factor == 0 {
            return Err(ConfigError::invalid("retrieval.overfetch_factor", "must be >= 1"));
        }
        if !self.baseline && self.retrieval.scopes.is_empty() {
            return Err(ConfigError::empty("retrieval.scopes"));
        }
        let mut seen = BTreeSet::new();
        for (i, sc) in self.retrieval.scopes.iter().enumerate() {
            if !seen.insert(sc.scope) {
                return Err(ConfigError::DuplicateScope {
                    scope: sc.scope.to_string(),
                });
            }
            if sc.limit == 0 {
                return Err(ConfigError::invalid(
                    format!("retrieval.scopes[{i}].limit"),
                    "must be >= 1",
                ));
            }
        }
        if self.generation.model.trim().is_empty() {
            return Err(ConfigError::empty("generation.model"));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::invalid(
                "generation.temperature",
                format!("{} is outside [0, 2]", self.generation.temperature),
            ));
        }
        if self.grading.model.trim().is_empty() {
            return Err(ConfigError::empty("grading.model"));
        }
        let r = &self.retry;
        if r.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be >= 1"));
        }
        if r.initial_delay_ms > r.max_delay_ms {
            return Err(ConfigError::invalid(
                "retry.initial_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        if r.multiplier.is_nan() || r.multiplier < 1.0 {
            return Err(ConfigError::invalid("retry.multiplier", "must be >= 1.0"));
        }
        Ok(())
    }

    pub fn scope(&self, scope: Scope) -> Option<&ScopeConfig> {
        self.retrieval.scopes.iter().find(|s| s.scope == scope)
    }

    pub fn from_yaml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: EvalConfig = serde_yaml::from_str(s).context("failed to parse eval config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_yaml_str(&content).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EvalConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.retry.policy().max_attempts, 4);
        assert_eq!(cfg.retry.policy().initial_delay, Duration::from_secs(1));
    }

    #[test]
    fn minimal_yaml_uses_defaults() {
        let cfg = EvalConfig::from_yaml_str("name: smoke\n").unwrap();
        assert_eq!(cfg.name, "smoke");
        assert_eq!(cfg.concurrency, 5);
        assert_eq!(cfg.retrieval.scopes.len(), 2);
        assert!(cfg.grading.completeness);
    }

    #[test]
    fn unknown_reranker_fails_at_load() {
        let yaml = r#"
retrieval:
  scopes:
    - { scope: facts, limit: 5, reranker: magic }
"#;
        assert!(EvalConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn rejects_duplicate_scopes_and_zero_limits() {
        let mut cfg = EvalConfig::default();
        cfg.retrieval.scopes.push(cfg.retrieval.scopes[0].clone());
        assert!(matches!(cfg.validate(), Err(ConfigError::DuplicateScope { .. })));

        let mut cfg = EvalConfig::default();
        cfg.retrieval.scopes[1].limit = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn baseline_may_omit_scopes() {
        let mut cfg = EvalConfig {
            baseline: true,
            ..Default::default()
        };
        cfg.retrieval.scopes.clear();
        cfg.validate().unwrap();
        cfg.baseline = false;
        assert_eq!(cfg.validate(), Err(ConfigError::empty("retrieval.scopes")));
    }

    #[test]
    fn rejects_inverted_retry_bounds() {
        let mut cfg = EvalConfig::default();
        cfg.retry.initial_delay_ms = 60_000;
        assert!(cfg.validate().is_err());
        let mut cfg = EvalConfig::default();
        cfg.concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn yaml_round_trip_is_stable() {
        let cfg = EvalConfig::default();
        let yaml = cfg.to_yaml().unwrap();
        assert_eq!(EvalConfig::from_yaml_str(&yaml).unwrap(), cfg);
    }
}
