//! Evaluation of a single test case.
//!
//! Stages: retrieve (all scopes concurrently, optional local rerank per scope)
//! -> compose -> optional summarization -> {generate, grade completeness}
//! concurrently -> grade correctness. Any stage failure fails the whole unit;
//! only reranking degrades gracefully to the un-reranked order.

use super::prompt;
use super::retry::{retry_call, RetryPolicy};
use crate::config::{EvalConfig, ScopeConfig};
use crate::errors::{ProviderError, UnitError, UnitStage};
use crate::model::{
    CompletenessVerdict, EvaluationResult, RerankerKind, RetrievedItem, ScopedItems,
    SummarizationStrategy, TestCase,
};
use crate::providers::{GenerateRequest, GradeRequest, SearchRequest, Services};
use futures::future::try_join_all;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// The slice of [`EvalConfig`] a unit needs, shared by every unit of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub baseline: bool,
    pub scopes: Vec<ScopeConfig>,
    pub overfetch_factor: usize,
    pub generation_model: String,
    pub temperature: f32,
    pub grading_model: String,
    pub grade_completeness: bool,
    pub summarization: SummarizationStrategy,
    pub retry: RetryPolicy,
}

impl From<&EvalConfig> for PipelineSettings {
    fn from(cfg: &EvalConfig) -> Self {
        Self {
            baseline: cfg.baseline,
            scopes: cfg.retrieval.scopes.clone(),
            overfetch_factor: cfg.retrieval.overfetch_factor.max(1),
            generation_model: cfg.generation.model.clone(),
            temperature: cfg.generation.temperature,
            grading_model: cfg.grading.model.clone(),
            grade_completeness: cfg.grading.completeness,
            summarization: cfg.summarization,
            retry: cfg.retry.policy(),
        }
    }
}

pub struct EvaluationUnit {
    test_case: TestCase,
    services: Arc<Services>,
    settings: Arc<PipelineSettings>,
}

impl EvaluationUnit {
    pub fn new(test_case: TestCase, services: Arc<Services>, settings: Arc<PipelineSettings>) -> Self {
        Self {
            test_case,
            services,
            settings,
        }
    }

    pub fn test_case(&self) -> &TestCase {
        &self.test_case
    }

    fn fail(&self, stage: UnitStage) -> impl Fn(ProviderError) -> UnitError + '_ {
        move |e| UnitError::new(self.test_case.id.clone(), stage, e)
    }

    fn enter(&self, stage: UnitStage) {
        debug!(test_case_id = %self.test_case.id, %stage, "unit stage");
    }

    pub async fn evaluate(&self) -> Result<EvaluationResult, UnitError> {
        let result = self.evaluate_inner().await;
        match &result {
            Ok(_) => self.enter(UnitStage::Done),
            Err(e) => debug!(test_case_id = %self.test_case.id, stage = %UnitStage::Failed, failed_at = %e.stage, "unit stage"),
        }
        result
    }

    async fn evaluate_inner(&self) -> Result<EvaluationResult, UnitError> {
        self.enter(UnitStage::Pending);
        let tc = &self.test_case;
        let settings = &self.settings;
        let started = Instant::now();

        let (scoped, retrieval_duration) = if settings.baseline {
            (Vec::new(), 0.0)
        } else {
            self.enter(UnitStage::Retrieving);
            let t = Instant::now();
            let scoped = try_join_all(settings.scopes.iter().map(|sc| self.retrieve_scope(sc))).await?;
            (scoped, t.elapsed().as_secs_f64())
        };

        self.enter(UnitStage::Composing);
        let mut context = if scoped.is_empty() {
            String::new()
        } else {
            self.services.composer.compose(&tc.query, &scoped)
        };

        let mut summarization_applied = false;
        if settings.summarization.is_enabled() && !context.is_empty() {
            match &self.services.summarizer {
                Some(summarizer) => {
                    self.enter(UnitStage::Summarizing);
                    context = retry_call(&settings.retry, "summarize", || {
                        summarizer.summarize(
                            settings.summarization,
                            &tc.query,
                            &context,
                            &settings.generation_model,
                        )
                    })
                    .await
                    .map_err(self.fail(UnitStage::Summarizing))?;
                    summarization_applied = true;
                }
                None => {
                    warn!(test_case_id = %tc.id, strategy = %settings.summarization, "no summarizer configured, context left as-is")
                }
            }
        }
        let context_token_count = self.services.composer.count_tokens(&context);
        let context_char_count = context.chars().count();

        let generation = self.generate(&context);
        let completeness = self.grade_completeness(&context);
        let ((hypothesis, response_duration), completeness) = tokio::try_join!(generation, completeness)?;

        self.enter(UnitStage::GradingCorrectness);
        let t = Instant::now();
        let grade_req = GradeRequest {
            system_prompt: prompt::CORRECTNESS_SYSTEM_PROMPT.to_string(),
            user_prompt: prompt::correctness_prompt(tc, &hypothesis),
            model: settings.grading_model.clone(),
            schema: prompt::correctness_schema(),
        };
        let grader = &self.services.grader;
        let raw = retry_call(&settings.retry, "grade_correctness", || grader.grade(&grade_req))
            .await
            .map_err(self.fail(UnitStage::GradingCorrectness))?;
        let verdict = prompt::parse_correctness(grader.provider_name(), raw)
            .map_err(self.fail(UnitStage::GradingCorrectness))?;
        let grading_duration = t.elapsed().as_secs_f64();

        let (completeness_grade, completeness_reasoning, missing_elements, present_elements) =
            match completeness {
                Some(c) => (
                    Some(c.grade),
                    c.reasoning,
                    c.missing_elements,
                    c.present_elements,
                ),
                None => (None, String::new(), Vec::new(), Vec::new()),
            };

        Ok(EvaluationResult {
            test_case_id: tc.id.clone(),
            category: tc.category.clone(),
            difficulty: tc.difficulty.clone(),
            query: tc.query.clone(),
            golden_answer: tc.golden_answer.clone(),
            hypothesis,
            context_text: context,
            context_token_count,
            context_char_count,
            retrieval_duration,
            response_duration,
            grading_duration,
            total_duration: started.elapsed().as_secs_f64(),
            is_correct: verdict.is_correct,
            correctness_reasoning: verdict.reasoning,
            completeness_grade,
            completeness_reasoning,
            missing_elements,
            present_elements,
            summarization_applied,
        })
    }

    async fn retrieve_scope(&self, sc: &ScopeConfig) -> Result<ScopedItems, UnitError> {
        let retrieval = &self.services.retrieval;
        let local_rerank = sc.reranker != RerankerKind::None
            && !retrieval.supports_reranker(sc.scope, sc.reranker);

        let request = if local_rerank {
            SearchRequest {
                graph_id: self.test_case.graph_id.clone(),
                query: self.test_case.query.clone(),
                scope: sc.scope,
                reranker: None,
                limit: (sc.limit * self.settings.overfetch_factor).min(retrieval.max_limit()),
            }
        } else {
            SearchRequest {
                graph_id: self.test_case.graph_id.clone(),
                query: self.test_case.query.clone(),
                scope: sc.scope,
                reranker: (sc.reranker != RerankerKind::None).then_some(sc.reranker),
                limit: sc.limit.min(retrieval.max_limit()),
            }
        };
        let op = format!("search_{}", sc.scope);
        let items = retry_call(&self.settings.retry, &op, || retrieval.search(&request))
            .await
            .map_err(self.fail(UnitStage::Retrieving))?;

        let items = if local_rerank {
            self.rerank(sc, items).await
        } else {
            items
        };
        Ok(ScopedItems {
            scope: sc.scope,
            items,
        })
    }

    /// Best-effort: on any failure the original order is kept, truncated.
    async fn rerank(&self, sc: &ScopeConfig, mut items: Vec<RetrievedItem>) -> Vec<RetrievedItem> {
        self.enter(UnitStage::Reranking);
        let Some(reranker) = &self.services.reranker else {
            warn!(test_case_id = %self.test_case.id, scope = %sc.scope, reranker = %sc.reranker, "no local reranker, keeping retrieval order");
            items.truncate(sc.limit);
            return items;
        };
        let query = &self.test_case.query;
        let attempt = retry_call(&self.settings.retry, "rerank", || {
            reranker.rerank(sc.reranker, query, items.clone(), sc.limit)
        })
        .await;
        match attempt {
            Ok(mut reranked) => {
                reranked.truncate(sc.limit);
                reranked
            }
            Err(e) => {
                warn!(test_case_id = %self.test_case.id, scope = %sc.scope, reranker = %sc.reranker, error = %e, "rerank failed, falling back to retrieval order");
                items.truncate(sc.limit);
                items
            }
        }
    }

    async fn generate(&self, context: &str) -> Result<(String, f64), UnitError> {
        self.enter(UnitStage::Generating);
        let system_prompt = if self.settings.baseline {
            prompt::BASELINE_SYSTEM_PROMPT
        } else {
            prompt::ANSWER_SYSTEM_PROMPT
        };
        let request = GenerateRequest {
            system_prompt: system_prompt.to_string(),
            user_prompt: prompt::answer_prompt(&self.test_case.query, context),
            model: self.settings.generation_model.clone(),
            temperature: self.settings.temperature,
        };
        let llm = &self.services.llm;
        let t = Instant::now();
        let text = retry_call(&self.settings.retry, "generate", || llm.generate(&request))
            .await
            .map_err(self.fail(UnitStage::Generating))?;
        Ok((text.trim().to_string(), t.elapsed().as_secs_f64()))
    }

    async fn grade_completeness(&self, context: &str) -> Result<Option<CompletenessVerdict>, UnitError> {
        if !self.settings.grade_completeness {
            return Ok(None);
        }
        self.enter(UnitStage::GradingCompleteness);
        let request = GradeRequest {
            system_prompt: prompt::COMPLETENESS_SYSTEM_PROMPT.to_string(),
            user_prompt: prompt::completeness_prompt(&self.test_case, context),
            model: self.settings.grading_model.clone(),
            schema: prompt::completeness_schema(),
        };
        let grader = &self.services.grader;
        let raw = retry_call(&self.settings.retry, "grade_completeness", || grader.grade(&request))
            .await
            .map_err(self.fail(UnitStage::GradingCompleteness))?;
        prompt::parse_completeness(grader.provider_name(), raw)
            .map(Some)
            .map_err(self.fail(UnitStage::GradingCompleteness))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompletenessGrade, Scope};
    use crate::providers::fake::{FakeGrader, FakeLlm, FakeReranker, FakeRetrieval, FakeSummarizer};
    use std::time::Duration;

    fn case() -> TestCase {
        TestCase {
            id: "q-1".into(),
            graph_id: "conv-1".into(),
            category: "single-hop".into(),
            difficulty: "easy".into(),
            query: "Where does Alice live?".into(),
            golden_answer: "Lyon".into(),
        }
    }

    fn facts(n: usize) -> Vec<RetrievedItem> {
        (0..n)
            .map(|i| RetrievedItem::Fact {
                text: format!("fact {i}"),
                valid_from: None,
                valid_to: None,
            })
            .collect()
    }

    fn settings(scopes: Vec<ScopeConfig>) -> PipelineSettings {
        let mut cfg = EvalConfig::default();
        cfg.retrieval.scopes = scopes;
        cfg.retry.initial_delay_ms = 10;
        cfg.retry.max_delay_ms = 100;
        PipelineSettings::from(&cfg)
    }

    fn facts_scope(limit: usize, reranker: RerankerKind) -> ScopeConfig {
        ScopeConfig {
            scope: Scope::Facts,
            limit,
            reranker,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_fills_every_field() {
        let retrieval = Arc::new(
            FakeRetrieval::new()
                .with_items(Scope::Facts, facts(3))
                .with_native_rerankers([RerankerKind::Rrf]),
        );
        let services = Services::new(
            retrieval.clone(),
            Arc::new(FakeLlm::new("  Lyon  ")),
            Arc::new(FakeGrader::new().with_grade(CompletenessGrade::Partial)),
        );
        let unit = EvaluationUnit::new(
            case(),
            Arc::new(services),
            Arc::new(settings(vec![facts_scope(2, RerankerKind::Rrf)])),
        );
        let r = unit.evaluate().await.unwrap();
        assert_eq!(r.hypothesis, "Lyon");
        assert!(r.is_correct);
        assert_eq!(r.completeness_grade, Some(CompletenessGrade::Partial));
        assert!(r.context_text.contains("fact 1"));
        assert!(!r.context_text.contains("fact 2"));
        assert_eq!(r.context_char_count, r.context_text.chars().count());
        assert!(!r.summarization_applied);

        let reqs = retrieval.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].reranker, Some(RerankerKind::Rrf));
        assert_eq!(reqs[0].graph_id, "conv-1");
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_reranker_overfetches_and_reranks_locally() {
        let retrieval = Arc::new(
            FakeRetrieval::new()
                .with_items(Scope::Facts, facts(40))
                .with_max_limit(25),
        );
        let reranker = Arc::new(FakeReranker::new());
        let services = Services::new(retrieval.clone(), Arc::new(FakeLlm::default()), Arc::new(FakeGrader::new()))
            .with_reranker(reranker.clone());
        let unit = EvaluationUnit::new(
            case(),
            Arc::new(services),
            Arc::new(settings(vec![facts_scope(10, RerankerKind::CrossEncoder)])),
        );
        let r = unit.evaluate().await.unwrap();

        let reqs = retrieval.requests();
        assert_eq!(reqs[0].limit, 25, "min(10 * 3, 25)");
        assert_eq!(reqs[0].reranker, None);
        assert_eq!(reranker.calls(), 1);
        // reversed by the fake reranker, then truncated to 10
        assert!(r.context_text.contains("fact 24 "));
        assert!(r.context_text.contains("fact 15 "));
        assert!(!r.context_text.contains("fact 14 "));
    }

    #[tokio::test(start_paused = true)]
    async fn local_rerank_time_counts_as_retrieval() {
        let retrieval = Arc::new(FakeRetrieval::new().with_items(Scope::Facts, facts(8)));
        let reranker = Arc::new(FakeReranker::new().with_latency(Duration::from_millis(300)));
        let services = Services::new(retrieval, Arc::new(FakeLlm::default()), Arc::new(FakeGrader::new()))
            .with_reranker(reranker);
        let unit = EvaluationUnit::new(
            case(),
            Arc::new(services),
            Arc::new(settings(vec![facts_scope(4, RerankerKind::Mmr)])),
        );
        let r = unit.evaluate().await.unwrap();
        assert!(r.retrieval_duration >= 0.3, "{}", r.retrieval_duration);
        assert!(r.total_duration >= r.retrieval_duration);
    }

    #[tokio::test(start_paused = true)]
    async fn rerank_failure_falls_back_to_retrieval_order() {
        let retrieval = Arc::new(FakeRetrieval::new().with_items(Scope::Facts, facts(30)));
        let reranker = Arc::new(FakeReranker::failing(ProviderError::from_status("rr", 400, "bad")));
        let services = Services::new(retrieval, Arc::new(FakeLlm::default()), Arc::new(FakeGrader::new()))
            .with_reranker(reranker);
        let unit = EvaluationUnit::new(
            case(),
            Arc::new(services),
            Arc::new(settings(vec![facts_scope(5, RerankerKind::Mmr)])),
        );
        let r = unit.evaluate().await.unwrap();
        assert!(r.context_text.contains("fact 0"));
        assert!(r.context_text.contains("fact 4"));
        assert!(!r.context_text.contains("fact 5"));
    }

    #[tokio::test(start_paused = true)]
    async fn baseline_skips_retrieval() {
        let retrieval = Arc::new(FakeRetrieval::new().with_items(Scope::Facts, facts(3)));
        let services = Services::new(retrieval.clone(), Arc::new(FakeLlm::default()), Arc::new(FakeGrader::new()));
        let mut s = settings(vec![facts_scope(2, RerankerKind::None)]);
        s.baseline = true;
        let r = EvaluationUnit::new(case(), Arc::new(services), Arc::new(s))
            .evaluate()
            .await
            .unwrap();
        assert_eq!(retrieval.calls(), 0);
        assert_eq!(r.retrieval_duration, 0.0);
        assert!(r.context_text.is_empty());
        assert_eq!(r.context_token_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_generation_errors_are_retried() {
        let llm = Arc::new(FakeLlm::new("ok").fail_first(2, ProviderError::from_status("llm", 502, "gw")));
        let services = Services::new(
            Arc::new(FakeRetrieval::new().with_items(Scope::Facts, facts(1))),
            llm.clone(),
            Arc::new(FakeGrader::new()),
        );
        let unit = EvaluationUnit::new(
            case(),
            Arc::new(services),
            Arc::new(settings(vec![facts_scope(1, RerankerKind::None)])),
        );
        unit.evaluate().await.unwrap();
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_names_the_stage() {
        let services = Services::new(
            Arc::new(FakeRetrieval::new().fail_when("Alice", ProviderError::from_status("graph", 404, "no graph"))),
            Arc::new(FakeLlm::default()),
            Arc::new(FakeGrader::new()),
        );
        let unit = EvaluationUnit::new(
            case(),
            Arc::new(services),
            Arc::new(settings(vec![facts_scope(1, RerankerKind::None)])),
        );
        let err = unit.evaluate().await.unwrap_err();
        assert_eq!(err.stage, UnitStage::Retrieving);
        assert_eq!(err.test_case_id, "q-1");
        assert!(!err.retries_exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_grading_fails_without_retry() {
        let grader = Arc::new(FakeGrader::new().with_raw_response(serde_json::json!({"nope": 1})));
        let services = Services::new(
            Arc::new(FakeRetrieval::new().with_items(Scope::Facts, facts(1))),
            Arc::new(FakeLlm::default()),
            grader.clone(),
        );
        let mut s = settings(vec![facts_scope(1, RerankerKind::None)]);
        s.grade_completeness = false;
        let err = EvaluationUnit::new(case(), Arc::new(services), Arc::new(s))
            .evaluate()
            .await
            .unwrap_err();
        assert_eq!(err.stage, UnitStage::GradingCorrectness);
        assert_eq!(err.source.kind(), "invalid_response");
        assert_eq!(grader.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn summarization_rewrites_context() {
        let services = Services::new(
            Arc::new(FakeRetrieval::new().with_items(Scope::Facts, facts(2))),
            Arc::new(FakeLlm::default()),
            Arc::new(FakeGrader::new()),
        )
        .with_summarizer(Arc::new(FakeSummarizer::new()));
        let mut s = settings(vec![facts_scope(2, RerankerKind::None)]);
        s.summarization = SummarizationStrategy::Concise;
        let r = EvaluationUnit::new(case(), Arc::new(services), Arc::new(s))
            .evaluate()
            .await
            .unwrap();
        assert!(r.summarization_applied);
        assert!(r.context_text.starts_with("[concise]"));
    }

    #[tokio::test(start_paused = true)]
    async fn retrieval_duration_is_wall_clock_of_slowest_scope() {
        let services = Services::new(
            Arc::new(
                FakeRetrieval::new()
                    .with_items(Scope::Facts, facts(1))
                    .with_latency(Duration::from_millis(200)),
            ),
            Arc::new(FakeLlm::default()),
            Arc::new(FakeGrader::new()),
        );
        let s = settings(vec![
            facts_scope(1, RerankerKind::None),
            ScopeConfig {
                scope: Scope::Entities,
                limit: 1,
                reranker: RerankerKind::None,
            },
        ]);
        let r = EvaluationUnit::new(case(), Arc::new(services), Arc::new(s))
            .evaluate()
            .await
            .unwrap();
        assert!(r.retrieval_duration >= 0.2 && r.retrieval_duration < 0.4, "{}", r.retrieval_duration);
        assert!(r.total_duration >= r.retrieval_duration);
    }
}
