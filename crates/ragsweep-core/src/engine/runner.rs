//! Drives one configuration over a dataset.
//!
//! One [`EvaluationUnit`] per test case is submitted to a
//! [`BoundedTaskRunner`]; results are consumed in completion order by a
//! single loop that owns the running counters. Unit failures are logged and
//! skipped, never fatal to the run.

use super::pool::{BoundedTaskRunner, TaskError};
use super::unit::{EvaluationUnit, PipelineSettings};
use crate::config::EvalConfig;
use crate::errors::{ConfigError, UnitError};
use crate::metrics::{ExperimentRecord, RunMetrics};
use crate::model::{EvaluationResult, RerankerKind, TestCase};
use crate::providers::Services;
use crate::report::progress::{format_progress_line, ProgressEvent, ProgressSink};
use crate::storage::{naming, ResultsStore, RunRecord, UnitFailure};
use anyhow::Context;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Results and failures of one pass over a dataset, in completion order.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub results: Vec<EvaluationResult>,
    pub failures: Vec<UnitFailure>,
}

impl RunOutcome {
    pub fn metrics(&self) -> RunMetrics {
        RunMetrics::compute(&self.results)
    }

    pub fn attempted(&self) -> usize {
        self.results.len() + self.failures.len()
    }
}

/// What a multi-run experiment wrote.
#[derive(Debug, Clone)]
pub struct ExperimentOutcome {
    pub experiment_id: String,
    pub dir: PathBuf,
    pub runs: Vec<RunMetrics>,
    pub summary: Option<ExperimentRecord>,
}

/// Every configured step must have a service to run it. Baseline runs
/// retrieve nothing, so they need neither a reranker nor a summarizer.
fn check_capabilities(config: &EvalConfig, services: &Services) -> Result<(), ConfigError> {
    if config.baseline {
        return Ok(());
    }
    if config.summarization.is_enabled() && services.summarizer.is_none() {
        return Err(ConfigError::invalid(
            "summarization",
            format!("strategy `{}` needs a summarizer service", config.summarization),
        ));
    }
    if services.reranker.is_none() {
        let unsupported = config.retrieval.scopes.iter().find(|sc| {
            sc.reranker != RerankerKind::None && !services.retrieval.supports_reranker(sc.scope, sc.reranker)
        });
        if let Some(sc) = unsupported {
            return Err(ConfigError::invalid(
                format!("retrieval.scopes.{}.reranker", sc.scope),
                format!(
                    "`{}` is not applied by the retrieval service and no local reranker is configured",
                    sc.reranker
                ),
            ));
        }
    }
    Ok(())
}

pub struct EvaluationRunner {
    config: EvalConfig,
    services: Arc<Services>,
    settings: Arc<PipelineSettings>,
}

impl EvaluationRunner {
    pub fn new(config: EvalConfig, services: Arc<Services>) -> anyhow::Result<Self> {
        config
            .validate()
            .and_then(|()| check_capabilities(&config, &services))
            .with_context(|| format!("invalid config '{}'", config.name))?;
        let settings = Arc::new(PipelineSettings::from(&config));
        Ok(Self {
            config,
            services,
            settings,
        })
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub async fn run_cases(&self, cases: &[TestCase], progress: Option<ProgressSink>) -> RunOutcome {
        let total = cases.len();
        let mut pool: BoundedTaskRunner<EvaluationResult, UnitError> =
            BoundedTaskRunner::new(self.config.concurrency);
        for tc in cases {
            let unit = EvaluationUnit::new(tc.clone(), self.services.clone(), self.settings.clone());
            pool.submit(async move { unit.evaluate().await });
        }

        let mut outcome = RunOutcome {
            results: Vec::with_capacity(total),
            failures: Vec::new(),
        };
        let mut correct = 0usize;
        while let Some(done) = pool.next_completed().await {
            match done.outcome {
                Ok(result) => {
                    if result.is_correct {
                        correct += 1;
                    }
                    outcome.results.push(result);
                }
                Err(TaskError::Failed(e)) => {
                    warn!(
                        test_case_id = %e.test_case_id,
                        stage = %e.stage,
                        kind = e.source.kind(),
                        error = %e.source,
                        "evaluation unit failed, skipping"
                    );
                    outcome.failures.push(UnitFailure {
                        test_case_id: e.test_case_id.clone(),
                        stage: Some(e.stage),
                        kind: e.source.kind().to_string(),
                        message: e.source.to_string(),
                    });
                }
                Err(other) => {
                    let test_case_id = cases
                        .get(done.index)
                        .map(|tc| tc.id.clone())
                        .unwrap_or_else(|| "unknown".to_string());
                    warn!(test_case_id = %test_case_id, error = %other, "evaluation task aborted, skipping");
                    outcome.failures.push(UnitFailure {
                        test_case_id,
                        stage: None,
                        kind: "task".to_string(),
                        message: other.to_string(),
                    });
                }
            }
            let event = ProgressEvent {
                done: outcome.attempted(),
                total,
                correct,
                failed: outcome.failures.len(),
            };
            debug!(config = %self.config.name, "{}", format_progress_line(&event));
            if let Some(sink) = &progress {
                sink(event);
            }
        }

        if !outcome.failures.is_empty() {
            warn!(
                config = %self.config.name,
                failed = outcome.failures.len(),
                total,
                "run finished with failed units"
            );
        }
        outcome
    }

    /// One full pass, packaged with a fresh run id and the config snapshot.
    pub async fn run(&self, cases: &[TestCase], progress: Option<ProgressSink>) -> RunRecord {
        let timestamp = Utc::now();
        let run_id = naming::new_run_id(timestamp);
        info!(run_id = %run_id, config = %self.config.name, cases = cases.len(), "starting run");
        let outcome = self.run_cases(cases, progress).await;
        let metrics = outcome.metrics();
        info!(
            run_id = %run_id,
            accuracy = metrics.accuracy,
            correct = metrics.correct_count,
            total = metrics.total_count,
            failed = outcome.failures.len(),
            "run finished"
        );
        RunRecord {
            run_id,
            timestamp,
            config_snapshot: self.config.clone(),
            metrics,
            results: outcome.results,
            failures: outcome.failures,
        }
    }

    /// Runs the dataset `num_runs` times into one experiment directory:
    /// one results file per run, the config once, and the summary last.
    pub async fn run_experiment(
        &self,
        cases: &[TestCase],
        num_runs: usize,
        store: &ResultsStore,
        experiment_id: &str,
    ) -> anyhow::Result<ExperimentOutcome> {
        let mut writer = store.begin_experiment(experiment_id, &self.config)?;
        let mut runs = Vec::with_capacity(num_runs);
        let mut pooled = Vec::new();
        for run_number in 1..=num_runs {
            info!(experiment_id = %writer.experiment_id(), run_number, num_runs, "starting experiment run");
            let outcome = self.run_cases(cases, None).await;
            let metrics = outcome.metrics();
            writer
                .save_run(run_number, &metrics, &outcome.results)
                .with_context(|| format!("failed to save run {run_number}"))?;
            runs.push(metrics);
            pooled.extend(outcome.results);
        }
        let summary = writer.save_summary(&runs, &pooled)?;
        Ok(ExperimentOutcome {
            experiment_id: writer.experiment_id().to_string(),
            dir: writer.dir().to_path_buf(),
            runs,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::model::{RetrievedItem, Scope, SummarizationStrategy};
    use crate::providers::fake::{FakeGrader, FakeLlm, FakeReranker, FakeRetrieval, FakeServices, FakeSummarizer};
    use std::sync::Mutex;

    fn cases(n: usize) -> Vec<TestCase> {
        (0..n)
            .map(|i| TestCase {
                id: format!("case-{i}"),
                graph_id: "g".into(),
                category: if i % 2 == 0 { "even" } else { "odd" }.into(),
                difficulty: "easy".into(),
                query: format!("question number {i}?"),
                golden_answer: "gold".into(),
            })
            .collect()
    }

    fn fakes(llm: FakeLlm, grader: FakeGrader) -> FakeServices {
        FakeServices::new(
            FakeRetrieval::new().with_items(
                Scope::Facts,
                vec![RetrievedItem::Fact {
                    text: "a fact".into(),
                    valid_from: None,
                    valid_to: None,
                }],
            )
            .with_native_rerankers([RerankerKind::Rrf]),
            llm,
            grader,
        )
    }

    fn config() -> EvalConfig {
        let mut cfg = EvalConfig::default();
        cfg.concurrency = 2;
        cfg.retry.initial_delay_ms = 1;
        cfg.retry.max_delay_ms = 5;
        cfg
    }

    #[tokio::test(start_paused = true)]
    async fn failed_units_are_skipped_and_counted() {
        let f = fakes(
            FakeLlm::default().fail_when("number 3?", ProviderError::from_status("llm", 400, "bad")),
            FakeGrader::new(),
        );
        let runner = EvaluationRunner::new(config(), Arc::new(f.services())).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink: ProgressSink = Arc::new(move |ev: ProgressEvent| sink_events.lock().unwrap().push(ev));

        let outcome = runner.run_cases(&cases(5), Some(sink)).await;
        assert_eq!(outcome.results.len(), 4);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].test_case_id, "case-3");
        assert_eq!(outcome.failures[0].kind, "provider_client");

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 5);
        let last = events.last().unwrap();
        assert_eq!((last.done, last.total, last.correct, last.failed), (5, 5, 4, 1));
        assert!(events.windows(2).all(|w| w[0].done < w[1].done));
    }

    #[tokio::test(start_paused = true)]
    async fn all_failed_run_still_produces_a_record() {
        let f = fakes(
            FakeLlm::default().fail_when("question", ProviderError::from_status("llm", 401, "nope")),
            FakeGrader::new(),
        );
        let runner = EvaluationRunner::new(config(), Arc::new(f.services())).unwrap();
        let record = runner.run(&cases(3), None).await;
        assert!(naming::is_run_id(&record.run_id));
        assert_eq!(record.metrics.total_count, 0);
        assert_eq!(record.metrics.accuracy, 0.0);
        assert_eq!(record.failures.len(), 3);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let f = fakes(FakeLlm::default(), FakeGrader::new());
        let mut cfg = config();
        cfg.concurrency = 0;
        assert!(EvaluationRunner::new(cfg, Arc::new(f.services())).is_err());
    }

    #[test]
    fn summarization_without_summarizer_is_rejected() {
        let f = fakes(FakeLlm::default(), FakeGrader::new());
        let mut cfg = config();
        cfg.summarization = SummarizationStrategy::Concise;
        let err = EvaluationRunner::new(cfg.clone(), Arc::new(f.services())).err().unwrap();
        assert!(format!("{err:#}").contains("summarizer"), "{err:#}");

        let services = f.services().with_summarizer(Arc::new(FakeSummarizer::new()));
        assert!(EvaluationRunner::new(cfg.clone(), Arc::new(services)).is_ok());

        cfg.baseline = true;
        assert!(EvaluationRunner::new(cfg, Arc::new(f.services())).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_reranker_needs_a_local_reranker() {
        let f = fakes(FakeLlm::default(), FakeGrader::new());
        let mut cfg = config();
        for sc in &mut cfg.retrieval.scopes {
            sc.reranker = RerankerKind::CrossEncoder;
        }
        let err = EvaluationRunner::new(cfg.clone(), Arc::new(f.services())).err().unwrap();
        assert!(format!("{err:#}").contains("cross_encoder"), "{err:#}");

        let reranker = Arc::new(FakeReranker::new());
        let services = f.services().with_reranker(reranker.clone());
        let runner = EvaluationRunner::new(cfg, Arc::new(services)).unwrap();
        let outcome = runner.run_cases(&cases(1), None).await;
        assert_eq!(outcome.results.len(), 1);
        assert!(reranker.calls() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_cap_bounds_in_flight_generations() {
        let f = fakes(
            FakeLlm::default().with_latency(std::time::Duration::from_millis(50)),
            FakeGrader::new(),
        );
        let mut cfg = config();
        cfg.concurrency = 3;
        let runner = EvaluationRunner::new(cfg, Arc::new(f.services())).unwrap();
        let outcome = runner.run_cases(&cases(12), None).await;
        assert_eq!(outcome.results.len(), 12);
        assert!(f.llm.max_in_flight() <= 3, "{}", f.llm.max_in_flight());
        assert!(f.llm.max_in_flight() >= 2);
    }
}
