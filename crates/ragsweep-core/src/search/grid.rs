//! Exhaustive sweep: one trial per point of the Cartesian product, run under
//! `grid.trial_concurrency`. A failing or panicking trial is recorded as
//! FAILED and the sweep goes on; every point is attempted exactly once.

use super::artifacts::SearchArtifacts;
use super::executor::{ensure_evaluated, TrialExecutor};
use super::space::TrialConfig;
use super::trial::{best_trial, TrialCounts, TrialResult, TrialState};
use crate::config::SearchConfig;
use crate::engine::pool::BoundedTaskRunner;
use crate::fingerprint::trial_fingerprint;
use crate::metrics::RunMetrics;
use crate::model::TestCase;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSummary {
    pub search_id: String,
    pub generated_at: DateTime<Utc>,
    pub grid_size: usize,
    pub counts: TrialCounts,
    pub best_trial_number: Option<usize>,
    pub best_accuracy: Option<f64>,
    pub best_config: Option<TrialConfig>,
    /// COMPLETE trials by accuracy (best first), then the rest by number.
    pub trials: Vec<TrialResult>,
}

pub struct GridSearch {
    config: SearchConfig,
    executor: Arc<dyn TrialExecutor>,
}

/// Where a sweep's artifacts went.
#[derive(Debug, Clone)]
pub struct GridOutcome {
    pub dir: PathBuf,
    pub summary: GridSummary,
}

fn rank(a: &TrialResult, b: &TrialResult) -> Ordering {
    let complete = |t: &TrialResult| t.state == TrialState::Complete;
    match (complete(a), complete(b)) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => b
            .accuracy
            .unwrap_or(0.0)
            .total_cmp(&a.accuracy.unwrap_or(0.0))
            .then(a.trial_number.cmp(&b.trial_number)),
        (false, false) => a.trial_number.cmp(&b.trial_number),
    }
}

pub(crate) fn failed_trial(
    trial_number: usize,
    config: TrialConfig,
    intermediate_values: Vec<f64>,
    error: String,
    duration_secs: f64,
) -> TrialResult {
    TrialResult {
        trial_number,
        fingerprint: trial_fingerprint(&config).hex,
        config,
        state: TrialState::Failed,
        accuracy: None,
        metrics: None,
        intermediate_values,
        error: Some(error),
        duration_secs,
    }
}

async fn run_trial(
    trial_number: usize,
    config: TrialConfig,
    executor: Arc<dyn TrialExecutor>,
    cases: Arc<Vec<TestCase>>,
) -> anyhow::Result<TrialResult> {
    let state = TrialState::Created.transition(TrialState::Running)?;
    let started = Instant::now();
    info!(trial = trial_number, config = %config.slug(), "trial started");

    let evaluated = executor
        .evaluate(&config, &cases)
        .await
        .and_then(|results| ensure_evaluated(&cases, &results).map(|()| results));
    let duration_secs = started.elapsed().as_secs_f64();

    match evaluated {
        Ok(results) => {
            let metrics = RunMetrics::compute(&results);
            let state = state.transition(TrialState::Complete)?;
            info!(trial = trial_number, accuracy = metrics.accuracy, duration_secs, "trial finished");
            Ok(TrialResult {
                trial_number,
                fingerprint: trial_fingerprint(&config).hex,
                config,
                state,
                accuracy: Some(metrics.accuracy),
                intermediate_values: vec![metrics.accuracy],
                metrics: Some(metrics),
                error: None,
                duration_secs,
            })
        }
        Err(e) => {
            state.transition(TrialState::Failed)?;
            warn!(trial = trial_number, config = %config.slug(), error = %format!("{e:#}"), "trial failed");
            Ok(failed_trial(trial_number, config, Vec::new(), format!("{e:#}"), duration_secs))
        }
    }
}

impl GridSearch {
    pub fn new(config: SearchConfig, executor: Arc<dyn TrialExecutor>) -> anyhow::Result<Self> {
        config.validate().context("invalid search config")?;
        Ok(Self { config, executor })
    }

    /// Every grid point, numbered from 0 in enumeration order.
    pub fn trial_configs(&self) -> anyhow::Result<Vec<TrialConfig>> {
        let space = &self.config.space;
        space
            .grid_points()
            .iter()
            .map(|p| space.config_at(p).ok_or_else(|| anyhow!("grid point outside the space: {p:?}")))
            .collect()
    }

    pub async fn run(&self, cases: &[TestCase]) -> anyhow::Result<GridOutcome> {
        let configs = self.trial_configs()?;
        let artifacts = SearchArtifacts::create(&self.config.output_dir)?;
        info!(
            search_id = %artifacts.search_id(),
            trials = configs.len(),
            trial_concurrency = self.config.grid.trial_concurrency,
            cases = cases.len(),
            "starting grid search"
        );

        let cases = Arc::new(cases.to_vec());
        let mut pool: BoundedTaskRunner<TrialResult, anyhow::Error> =
            BoundedTaskRunner::new(self.config.grid.trial_concurrency);
        for (number, config) in configs.iter().enumerate() {
            let fut = run_trial(number, config.clone(), self.executor.clone(), cases.clone());
            pool.submit(fut);
        }

        let mut trials = Vec::with_capacity(configs.len());
        while let Some(done) = pool.next_completed().await {
            let result = match done.outcome {
                Ok(result) => result,
                Err(e) => {
                    let Some(config) = configs.get(done.index) else {
                        warn!(error = %e, "trial task aborted without an index");
                        continue;
                    };
                    warn!(trial = done.index, config = %config.slug(), error = %e, "trial aborted");
                    failed_trial(done.index, config.clone(), Vec::new(), e.to_string(), 0.0)
                }
            };
            artifacts.write_trial(&result)?;
            trials.push(result);
        }

        trials.sort_by(rank);
        let best = best_trial(&trials).cloned();
        let summary = GridSummary {
            search_id: artifacts.search_id().to_string(),
            generated_at: Utc::now(),
            grid_size: configs.len(),
            counts: TrialCounts::from_trials(&trials),
            best_trial_number: best.as_ref().map(|t| t.trial_number),
            best_accuracy: best.as_ref().and_then(|t| t.accuracy),
            best_config: best.map(|t| t.config),
            trials,
        };
        artifacts.write_grid_summary(&summary)?;
        info!(
            search_id = %summary.search_id,
            complete = summary.counts.complete,
            failed = summary.counts.failed,
            best_accuracy = ?summary.best_accuracy,
            "grid search finished"
        );
        Ok(GridOutcome {
            dir: artifacts.dir().to_path_buf(),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RerankerKind, SummarizationStrategy};

    fn result(number: usize, state: TrialState, accuracy: Option<f64>) -> TrialResult {
        let config = TrialConfig {
            entity_limit: 1,
            fact_limit: 1,
            reranker: RerankerKind::None,
            model: "m".into(),
            summarization: SummarizationStrategy::None,
            baseline: false,
        };
        TrialResult {
            state,
            accuracy,
            ..failed_trial(number, config, vec![], String::new(), 0.0)
        }
    }

    #[test]
    fn ranking_puts_complete_first_by_accuracy() {
        let mut trials = vec![
            result(0, TrialState::Failed, None),
            result(1, TrialState::Complete, Some(0.5)),
            result(2, TrialState::Complete, Some(0.9)),
            result(3, TrialState::Complete, Some(0.5)),
        ];
        trials.sort_by(rank);
        let order: Vec<usize> = trials.iter().map(|t| t.trial_number).collect();
        assert_eq!(order, vec![2, 1, 3, 0]);
    }
}
