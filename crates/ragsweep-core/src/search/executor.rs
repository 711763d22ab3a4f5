use super::space::TrialConfig;
use crate::config::EvalConfig;
use crate::engine::runner::EvaluationRunner;
use crate::model::{EvaluationResult, TestCase};
use crate::providers::Services;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;

/// Evaluates one search point over a slice of the dataset.
///
/// Unit failures inside the slice are skipped; only what stops the whole
/// slice from being evaluated is an error.
#[async_trait]
pub trait TrialExecutor: Send + Sync {
    async fn evaluate(&self, trial: &TrialConfig, cases: &[TestCase]) -> anyhow::Result<Vec<EvaluationResult>>;
}

/// Runs the real pipeline: `trial` applied onto a base config, with shared
/// service handles.
pub struct PipelineExecutor {
    base: EvalConfig,
    services: Arc<Services>,
}

impl PipelineExecutor {
    pub fn new(base: EvalConfig, services: Arc<Services>) -> anyhow::Result<Self> {
        base.validate().context("invalid base config")?;
        Ok(Self { base, services })
    }

    pub fn base(&self) -> &EvalConfig {
        &self.base
    }
}

#[async_trait]
impl TrialExecutor for PipelineExecutor {
    async fn evaluate(&self, trial: &TrialConfig, cases: &[TestCase]) -> anyhow::Result<Vec<EvaluationResult>> {
        let config = trial.apply(&self.base);
        let runner = EvaluationRunner::new(config, self.services.clone())?;
        let outcome = runner.run_cases(cases, None).await;
        Ok(outcome.results)
    }
}

/// Non-empty input with nothing evaluated is a trial-level failure.
pub(crate) fn ensure_evaluated(cases: &[TestCase], results: &[EvaluationResult]) -> anyhow::Result<()> {
    if !cases.is_empty() && results.is_empty() {
        anyhow::bail!("all {} evaluation units failed", cases.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RerankerKind, Scope, SummarizationStrategy};
    use crate::providers::fake::{FakeGrader, FakeLlm, FakeRetrieval, FakeServices};

    fn case(id: &str) -> TestCase {
        TestCase {
            id: id.into(),
            graph_id: "g".into(),
            category: "c".into(),
            difficulty: "d".into(),
            query: format!("{id}?"),
            golden_answer: "gold".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_executor_applies_trial_limits() {
        let fakes = FakeServices::new(FakeRetrieval::new(), FakeLlm::default(), FakeGrader::new());
        let mut base = EvalConfig::default();
        base.retry.initial_delay_ms = 1;
        let exec = PipelineExecutor::new(base, Arc::new(fakes.services())).unwrap();
        let trial = TrialConfig {
            entity_limit: 3,
            fact_limit: 7,
            reranker: RerankerKind::None,
            model: "m".into(),
            summarization: SummarizationStrategy::None,
            baseline: false,
        };
        let results = exec.evaluate(&trial, &[case("a"), case("b")]).await.unwrap();
        assert_eq!(results.len(), 2);
        let requests = fakes.retrieval.requests();
        assert!(requests.iter().any(|r| r.scope == Scope::Facts && r.limit == 7));
        assert!(requests.iter().any(|r| r.scope == Scope::Entities && r.limit == 3));
    }

    #[test]
    fn empty_results_fail_only_for_non_empty_input() {
        assert!(ensure_evaluated(&[], &[]).is_ok());
        assert!(ensure_evaluated(&[case("a")], &[]).is_err());
    }
}
