//! Aggregation of several runs of one configuration.
//!
//! Two views of the same quantities are kept side by side: `per_run` is the
//! distribution of each run-level metric across runs (run-to-run variance),
//! `pooled` is computed over every individual result of every run
//! (cross-run outliers). Neither is derivable from the other.

use super::run::RunMetrics;
use super::stats::DistributionStats;
use crate::model::EvaluationResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub experiment_id: String,
    pub num_runs: usize,
    /// Metric name -> distribution of that metric across runs.
    pub per_run: BTreeMap<String, DistributionStats>,
    pub pooled: RunMetrics,
}

impl ExperimentRecord {
    /// `None` when fewer than two runs are given.
    pub fn build(
        experiment_id: &str,
        runs: &[RunMetrics],
        pooled: &[EvaluationResult],
    ) -> Option<Self> {
        if runs.len() < 2 {
            return None;
        }
        let mut per_run = BTreeMap::new();
        let mut add = |name: &str, values: Vec<f64>| {
            per_run.insert(name.to_string(), DistributionStats::from_values(&values));
        };
        let each = |f: fn(&RunMetrics) -> f64| runs.iter().map(f).collect::<Vec<_>>();

        add("accuracy", each(|m| m.accuracy));
        add("correct_count", each(|m| m.correct_count as f64));
        add("total_count", each(|m| m.total_count as f64));
        add("completeness_complete_rate", each(|m| m.completeness_complete_rate));
        add("completeness_partial_rate", each(|m| m.completeness_partial_rate));
        add("completeness_insufficient_rate", each(|m| m.completeness_insufficient_rate));
        // Runs without any COMPLETE context do not contribute.
        add(
            "accuracy_with_complete_context",
            runs.iter().filter_map(|m| m.accuracy_with_complete_context).collect(),
        );
        add("mean_retrieval_duration", each(|m| m.retrieval_duration.mean));
        add("mean_response_duration", each(|m| m.response_duration.mean));
        add("mean_grading_duration", each(|m| m.grading_duration.mean));
        add("mean_total_duration", each(|m| m.total_duration.mean));
        add("p95_total_duration", each(|m| m.total_duration.p95));
        add("mean_context_tokens", each(|m| m.context_tokens.mean));

        Some(Self {
            experiment_id: experiment_id.to_string(),
            num_runs: runs.len(),
            per_run,
            pooled: RunMetrics::compute(pooled),
        })
    }

    pub fn per_run_stat(&self, metric: &str) -> Option<&DistributionStats> {
        self.per_run.get(metric)
    }
}
