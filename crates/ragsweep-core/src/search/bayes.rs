//! Sequential model-based sweep.
//!
//! Each trial is asked from the [`Study`], evaluated batch by batch with the
//! pooled accuracy reported after every batch, and told back exactly once:
//! COMPLETE with its final accuracy, PRUNED when the pruner stops it, or
//! FAILED when evaluation errors out. A pruned trial stops submitting
//! batches; the batch in flight is allowed to finish.

use super::artifacts::SearchArtifacts;
use super::executor::{ensure_evaluated, TrialExecutor};
use super::grid::failed_trial;
use super::space::TrialConfig;
use super::study::{Study, TrialOutcome};
use super::trial::{best_trial, TrialCounts, TrialResult, TrialState};
use super::{build_pruner, build_sampler};
use crate::config::SearchConfig;
use crate::engine::pool::panic_message;
use crate::fingerprint::trial_fingerprint;
use crate::metrics::RunMetrics;
use crate::model::{EvaluationResult, TestCase};
use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianSummary {
    pub search_id: String,
    pub generated_at: DateTime<Utc>,
    pub sampler: String,
    pub pruner: String,
    pub seed: u64,
    pub counts: TrialCounts,
    pub best_trial_number: Option<usize>,
    pub best_accuracy: Option<f64>,
    pub best_config: Option<TrialConfig>,
    /// In trial-number order.
    pub trials: Vec<TrialResult>,
}

#[derive(Debug, Clone)]
pub struct BayesianOutcome {
    pub dir: PathBuf,
    pub summary: BayesianSummary,
    pub asks: usize,
    pub tells: usize,
}

pub struct BayesianSearch {
    config: SearchConfig,
    executor: Arc<dyn TrialExecutor>,
}

enum BatchEnd {
    Finished,
    Pruned,
    Failed(String),
}

impl BayesianSearch {
    pub fn new(config: SearchConfig, executor: Arc<dyn TrialExecutor>) -> anyhow::Result<Self> {
        config.validate().context("invalid search config")?;
        Ok(Self { config, executor })
    }

    async fn evaluate_batch(&self, config: &TrialConfig, batch: &[TestCase]) -> anyhow::Result<Vec<EvaluationResult>> {
        match AssertUnwindSafe(self.executor.evaluate(config, batch)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!("trial panicked: {}", panic_message(payload.as_ref()))),
        }
    }

    pub async fn run(&self, cases: &[TestCase]) -> anyhow::Result<BayesianOutcome> {
        let bayes = &self.config.bayesian;
        let mut study = Study::new(
            self.config.space.clone(),
            build_sampler(bayes),
            build_pruner(&bayes.pruner),
            bayes.seed,
        )?;
        let artifacts = SearchArtifacts::create(&self.config.output_dir)?;
        let batches: Vec<&[TestCase]> = cases.chunks(bayes.batch_size).collect();
        info!(
            search_id = %artifacts.search_id(),
            n_trials = bayes.n_trials,
            sampler = study.sampler_name(),
            pruner = study.pruner_name(),
            batches = batches.len(),
            "starting bayesian search"
        );

        let mut trials = Vec::with_capacity(bayes.n_trials);
        for _ in 0..bayes.n_trials {
            let mut running = study.ask()?;
            let number = running.number();
            let config = running.config().clone();
            let started = Instant::now();
            info!(trial = number, config = %config.slug(), "trial started");

            let mut pooled: Vec<EvaluationResult> = Vec::new();
            let mut end = BatchEnd::Finished;
            for (step, batch) in batches.iter().enumerate() {
                match self.evaluate_batch(&config, batch).await {
                    Ok(results) => pooled.extend(results),
                    Err(e) => {
                        end = BatchEnd::Failed(format!("{e:#}"));
                        break;
                    }
                }
                let accuracy = RunMetrics::compute(&pooled).accuracy;
                study.report(&mut running, accuracy);
                if study.should_prune(&running) {
                    info!(trial = number, step, accuracy, "trial pruned");
                    end = BatchEnd::Pruned;
                    break;
                }
            }
            if matches!(end, BatchEnd::Finished) {
                if let Err(e) = ensure_evaluated(cases, &pooled) {
                    end = BatchEnd::Failed(e.to_string());
                }
            }

            let duration_secs = started.elapsed().as_secs_f64();
            let metrics = RunMetrics::compute(&pooled);
            let outcome = match &end {
                BatchEnd::Finished => TrialOutcome::Complete(metrics.accuracy),
                BatchEnd::Pruned => TrialOutcome::Pruned,
                BatchEnd::Failed(_) => TrialOutcome::Failed,
            };
            let frozen = study.tell(running, outcome)?;

            let result = match end {
                BatchEnd::Failed(error) => {
                    warn!(trial = number, config = %config.slug(), error = %error, "trial failed");
                    failed_trial(number, config, frozen.intermediate_values, error, duration_secs)
                }
                BatchEnd::Finished | BatchEnd::Pruned => {
                    if frozen.state == TrialState::Complete {
                        info!(trial = number, accuracy = metrics.accuracy, duration_secs, "trial finished");
                    }
                    TrialResult {
                        trial_number: number,
                        fingerprint: trial_fingerprint(&config).hex,
                        config,
                        state: frozen.state,
                        accuracy: frozen.value,
                        metrics: Some(metrics),
                        intermediate_values: frozen.intermediate_values,
                        error: None,
                        duration_secs,
                    }
                }
            };
            artifacts.write_trial(&result)?;
            trials.push(result);
        }

        let best = best_trial(&trials).cloned();
        let summary = BayesianSummary {
            search_id: artifacts.search_id().to_string(),
            generated_at: Utc::now(),
            sampler: study.sampler_name().to_string(),
            pruner: study.pruner_name().to_string(),
            seed: bayes.seed,
            counts: TrialCounts::from_trials(&trials),
            best_trial_number: best.as_ref().map(|t| t.trial_number),
            best_accuracy: best.as_ref().and_then(|t| t.accuracy),
            best_config: best.map(|t| t.config),
            trials,
        };
        artifacts.write_bayesian_summary(&summary)?;
        info!(
            search_id = %summary.search_id,
            complete = summary.counts.complete,
            pruned = summary.counts.pruned,
            failed = summary.counts.failed,
            best_accuracy = ?summary.best_accuracy,
            "bayesian search finished"
        );
        Ok(BayesianOutcome {
            dir: artifacts.dir().to_path_buf(),
            summary,
            asks: study.asks(),
            tells: study.tells(),
        })
    }
}
