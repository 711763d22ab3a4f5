//! Hyperparameter space. Every parameter is categorical: a point is one index
//! per parameter into its value list, in [`PARAM_NAMES`] order.

use crate::config::{EvalConfig, ScopeConfig};
use crate::errors::ConfigError;
use crate::model::{RerankerKind, Scope, SummarizationStrategy};
use crate::storage::naming;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const PARAM_NAMES: [&str; 6] = [
    "entity_limit",
    "fact_limit",
    "reranker",
    "model",
    "summarization",
    "baseline",
];

fn default_summarization() -> Vec<SummarizationStrategy> {
    vec![SummarizationStrategy::None]
}

fn default_baseline() -> Vec<bool> {
    vec![false]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub entity_limits: Vec<usize>,
    pub fact_limits: Vec<usize>,
    pub rerankers: Vec<RerankerKind>,
    pub models: Vec<String>,
    #[serde(default = "default_summarization")]
    pub summarization: Vec<SummarizationStrategy>,
    #[serde(default = "default_baseline")]
    pub baseline: Vec<bool>,
}

/// One point of the space, resolved to concrete values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrialConfig {
    pub entity_limit: usize,
    pub fact_limit: usize,
    pub reranker: RerankerKind,
    pub model: String,
    pub summarization: SummarizationStrategy,
    pub baseline: bool,
}

fn check_list<T: Ord>(field: &str, values: &[T]) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::empty(format!("space.{field}")));
    }
    let distinct: BTreeSet<&T> = values.iter().collect();
    if distinct.len() != values.len() {
        return Err(ConfigError::invalid(format!("space.{field}"), "values must be distinct"));
    }
    Ok(())
}

impl SearchSpace {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_list("entity_limits", &self.entity_limits)?;
        check_list("fact_limits", &self.fact_limits)?;
        check_list("rerankers", &self.rerankers)?;
        check_list("models", &self.models)?;
        check_list("summarization", &self.summarization)?;
        check_list("baseline", &self.baseline)?;
        if self.entity_limits.contains(&0) || self.fact_limits.contains(&0) {
            return Err(ConfigError::invalid("space", "limits must be >= 1"));
        }
        if self.models.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::invalid("space.models", "model names must be non-empty"));
        }
        Ok(())
    }

    /// Number of values per parameter, in [`PARAM_NAMES`] order.
    pub fn cardinalities(&self) -> Vec<usize> {
        vec![
            self.entity_limits.len(),
            self.fact_limits.len(),
            self.rerankers.len(),
            self.models.len(),
            self.summarization.len(),
            self.baseline.len(),
        ]
    }

    pub fn grid_size(&self) -> usize {
        self.cardinalities().iter().product()
    }

    /// Cartesian product of all index lists; the last parameter varies fastest.
    pub fn grid_points(&self) -> Vec<Vec<usize>> {
        let cards = self.cardinalities();
        let mut points: Vec<Vec<usize>> = vec![Vec::new()];
        for &card in &cards {
            points = points
                .into_iter()
                .flat_map(|prefix| {
                    (0..card).map(move |i| {
                        let mut p = prefix.clone();
                        p.push(i);
                        p
                    })
                })
                .collect();
        }
        points
    }

    /// `None` if `point` has the wrong arity or an index out of range.
    pub fn config_at(&self, point: &[usize]) -> Option<TrialConfig> {
        let [e, f, r, m, s, b] = point else {
            return None;
        };
        Some(TrialConfig {
            entity_limit: *self.entity_limits.get(*e)?,
            fact_limit: *self.fact_limits.get(*f)?,
            reranker: *self.rerankers.get(*r)?,
            model: self.models.get(*m)?.clone(),
            summarization: *self.summarization.get(*s)?,
            baseline: *self.baseline.get(*b)?,
        })
    }
}

impl TrialConfig {
    /// Concrete run configuration: `base` with this point's overrides.
    /// Missing entity/fact scopes are added.
    pub fn apply(&self, base: &EvalConfig) -> EvalConfig {
        let mut cfg = base.clone();
        for (scope, limit) in [(Scope::Entities, self.entity_limit), (Scope::Facts, self.fact_limit)] {
            match cfg.retrieval.scopes.iter_mut().find(|s| s.scope == scope) {
                Some(sc) => sc.limit = limit,
                None => cfg.retrieval.scopes.push(ScopeConfig {
                    scope,
                    limit,
                    reranker: self.reranker,
                }),
            }
        }
        for sc in &mut cfg.retrieval.scopes {
            sc.reranker = self.reranker;
        }
        cfg.generation.model = self.model.clone();
        cfg.summarization = self.summarization;
        cfg.baseline = self.baseline;
        cfg.name = format!("{}-{}", base.name, self.slug());
        cfg
    }

    /// Short filesystem-safe label, e.g. `e10_f20_rrf_gpt-4o-mini_none`.
    pub fn slug(&self) -> String {
        let mut s = format!(
            "e{}_f{}_{}_{}_{}",
            self.entity_limit, self.fact_limit, self.reranker, self.model, self.summarization
        );
        if self.baseline {
            s.push_str("_baseline");
        }
        naming::sanitize_id(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> SearchSpace {
        SearchSpace {
            entity_limits: vec![5, 10],
            fact_limits: vec![10, 20, 30],
            rerankers: vec![RerankerKind::Rrf, RerankerKind::CrossEncoder],
            models: vec!["gpt-4o-mini".into()],
            summarization: default_summarization(),
            baseline: default_baseline(),
        }
    }

    #[test]
    fn grid_points_are_unique_and_complete() {
        let s = space();
        let points = s.grid_points();
        assert_eq!(points.len(), 12);
        assert_eq!(s.grid_size(), 12);
        let unique: BTreeSet<_> = points.iter().collect();
        assert_eq!(unique.len(), 12);
        assert_eq!(points[0], vec![0, 0, 0, 0, 0, 0]);
        assert_eq!(points[1], vec![0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn config_at_rejects_bad_points() {
        let s = space();
        assert!(s.config_at(&[0, 0, 0, 0, 0]).is_none());
        assert!(s.config_at(&[2, 0, 0, 0, 0, 0]).is_none());
        let c = s.config_at(&[1, 2, 1, 0, 0, 0]).unwrap();
        assert_eq!(c.entity_limit, 10);
        assert_eq!(c.fact_limit, 30);
        assert_eq!(c.reranker, RerankerKind::CrossEncoder);
    }

    #[test]
    fn apply_overrides_base_config() {
        let base = EvalConfig::default();
        let c = space().config_at(&[0, 1, 1, 0, 0, 0]).unwrap();
        let cfg = c.apply(&base);
        assert_eq!(cfg.scope(Scope::Entities).unwrap().limit, 5);
        assert_eq!(cfg.scope(Scope::Facts).unwrap().limit, 20);
        assert!(cfg
            .retrieval
            .scopes
            .iter()
            .all(|s| s.reranker == RerankerKind::CrossEncoder));
        cfg.validate().unwrap();
        assert_eq!(c.slug(), "e5_f20_cross_encoder_gpt-4o-mini_none");
    }

    #[test]
    fn validate_rejects_duplicates() {
        let mut s = space();
        s.fact_limits.push(10);
        assert!(s.validate().is_err());
    }
}
