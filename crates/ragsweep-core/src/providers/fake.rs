//! In-memory collaborators for tests and dry runs.
//!
//! Each fake counts its calls and can be scripted to fail: the first `n`
//! calls with a given error (`fail_first`), or every call whose input
//! contains a needle (`fail_when`).

use super::{
    GenerateRequest, GradeRequest, Grader, LlmClient, RetrievalClient, Reranker, SearchRequest,
    Summarizer,
};
use crate::errors::ProviderError;
use crate::model::{CompletenessGrade, RerankerKind, RetrievedItem, Scope, SummarizationStrategy};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted failure injection shared by all fakes.
#[derive(Debug, Default)]
struct FailScript {
    first: Option<(usize, ProviderError)>,
    when: Vec<(String, ProviderError)>,
    calls: AtomicUsize,
}

impl FailScript {
    /// Registers a call and returns the error it should fail with, if any.
    fn check(&self, input: &str) -> Result<(), ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((_, err)) = self
            .when
            .iter()
            .find(|(needle, _)| input.contains(needle.as_str()))
        {
            return Err(err.clone());
        }
        match &self.first {
            Some((count, err)) if n < *count => Err(err.clone()),
            _ => Ok(()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Tracks concurrently running calls.
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Retrieval service with a fixed corpus per scope.
#[derive(Debug, Default)]
pub struct FakeRetrieval {
    corpus: BTreeMap<Scope, Vec<RetrievedItem>>,
    native: BTreeSet<RerankerKind>,
    max_limit: Option<usize>,
    latency: Option<Duration>,
    script: FailScript,
    requests: Mutex<Vec<SearchRequest>>,
}

impl FakeRetrieval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(mut self, scope: Scope, items: Vec<RetrievedItem>) -> Self {
        self.corpus.insert(scope, items);
        self
    }

    /// Rerankers the service applies itself; all others are applied locally.
    pub fn with_native_rerankers(mut self, kinds: impl IntoIterator<Item = RerankerKind>) -> Self {
        self.native.extend(kinds);
        self
    }

    pub fn with_max_limit(mut self, max: usize) -> Self {
        self.max_limit = Some(max);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fail_first(mut self, n: usize, err: ProviderError) -> Self {
        self.script.first = Some((n, err));
        self
    }

    /// Fails every search whose query contains `needle`.
    pub fn fail_when(mut self, needle: impl Into<String>, err: ProviderError) -> Self {
        self.script.when.push((needle.into(), err));
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RetrievalClient for FakeRetrieval {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievedItem>, ProviderError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.script.check(&request.query)?;
        let items = self.corpus.get(&request.scope).cloned().unwrap_or_default();
        Ok(items.into_iter().take(request.limit).collect())
    }

    fn supports_reranker(&self, _scope: Scope, reranker: RerankerKind) -> bool {
        self.native.contains(&reranker)
    }

    fn max_limit(&self) -> usize {
        self.max_limit.unwrap_or(50)
    }

    fn provider_name(&self) -> &'static str {
        "fake-retrieval"
    }
}

/// Generation service echoing a canned answer.
#[derive(Debug)]
pub struct FakeLlm {
    answer: String,
    latency: Option<Duration>,
    script: FailScript,
    in_flight: InFlight,
}

impl Default for FakeLlm {
    fn default() -> Self {
        Self::new("fake answer")
    }
}

impl FakeLlm {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            latency: None,
            script: FailScript::default(),
            in_flight: InFlight::default(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fail_first(mut self, n: usize, err: ProviderError) -> Self {
        self.script.first = Some((n, err));
        self
    }

    /// Fails every generation whose user prompt contains `needle`.
    pub fn fail_when(mut self, needle: impl Into<String>, err: ProviderError) -> Self {
        self.script.when.push((needle.into(), err));
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Highest number of generations observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.in_flight.max()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, ProviderError> {
        let _guard = self.in_flight.enter();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.script.check(&request.user_prompt)?;
        Ok(self.answer.clone())
    }

    fn provider_name(&self) -> &'static str {
        "fake-llm"
    }
}

/// Grader answering from the schema title: `correctness` or `completeness`.
///
/// A case is graded correct when its user prompt contains one of the
/// configured markers (by default every case is correct).
#[derive(Debug)]
pub struct FakeGrader {
    correct_markers: Option<Vec<String>>,
    grade: CompletenessGrade,
    raw_override: Option<serde_json::Value>,
    script: FailScript,
}

impl Default for FakeGrader {
    fn default() -> Self {
        Self {
            correct_markers: None,
            grade: CompletenessGrade::Complete,
            raw_override: None,
            script: FailScript::default(),
        }
    }
}

impl FakeGrader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only prompts containing one of `markers` are graded correct.
    pub fn correct_when(mut self, markers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.correct_markers = Some(markers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_grade(mut self, grade: CompletenessGrade) -> Self {
        self.grade = grade;
        self
    }

    /// Returns `value` verbatim for every request.
    pub fn with_raw_response(mut self, value: serde_json::Value) -> Self {
        self.raw_override = Some(value);
        self
    }

    pub fn fail_first(mut self, n: usize, err: ProviderError) -> Self {
        self.script.first = Some((n, err));
        self
    }

    pub fn fail_when(mut self, needle: impl Into<String>, err: ProviderError) -> Self {
        self.script.when.push((needle.into(), err));
        self
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl Grader for FakeGrader {
    async fn grade(&self, request: &GradeRequest) -> Result<serde_json::Value, ProviderError> {
        self.script.check(&request.user_prompt)?;
        if let Some(raw) = &self.raw_override {
            return Ok(raw.clone());
        }
        let title = request.schema.get("title").and_then(|t| t.as_str());
        match title {
            Some("completeness") => Ok(serde_json::json!({
                "grade": self.grade,
                "reasoning": "fake completeness",
                "missing_elements": [],
                "present_elements": ["everything"],
            })),
            Some("correctness") => {
                let is_correct = match &self.correct_markers {
                    None => true,
                    Some(markers) => markers.iter().any(|m| request.user_prompt.contains(m.as_str())),
                };
                Ok(serde_json::json!({
                    "is_correct": is_correct,
                    "reasoning": "fake correctness",
                }))
            }
            other => Err(ProviderError::Validation {
                provider: "fake-grader".into(),
                message: format!("unknown schema title {other:?}"),
            }),
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake-grader"
    }
}

/// Reverses the input order, or fails when told to.
#[derive(Debug, Default)]
pub struct FakeReranker {
    latency: Option<Duration>,
    script: FailScript,
}

impl FakeReranker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn failing(err: ProviderError) -> Self {
        Self {
            latency: None,
            script: FailScript {
                first: Some((usize::MAX, err)),
                ..FailScript::default()
            },
        }
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl Reranker for FakeReranker {
    async fn rerank(
        &self,
        _kind: RerankerKind,
        query: &str,
        mut items: Vec<RetrievedItem>,
        top_k: usize,
    ) -> Result<Vec<RetrievedItem>, ProviderError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.script.check(query)?;
        items.reverse();
        items.truncate(top_k);
        Ok(items)
    }
}

/// Prefixes the context with the strategy name.
#[derive(Debug, Default)]
pub struct FakeSummarizer {
    script: FailScript,
}

impl FakeSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(
        &self,
        strategy: SummarizationStrategy,
        query: &str,
        context: &str,
        _model: &str,
    ) -> Result<String, ProviderError> {
        self.script.check(query)?;
        let first_line = context.lines().next().unwrap_or_default();
        Ok(format!("[{strategy}] {first_line}"))
    }
}

/// Convenience bundle of fakes sharing one set of handles with the caller.
#[derive(Clone)]
pub struct FakeServices {
    pub retrieval: Arc<FakeRetrieval>,
    pub llm: Arc<FakeLlm>,
    pub grader: Arc<FakeGrader>,
}

impl FakeServices {
    pub fn new(retrieval: FakeRetrieval, llm: FakeLlm, grader: FakeGrader) -> Self {
        Self {
            retrieval: Arc::new(retrieval),
            llm: Arc::new(llm),
            grader: Arc::new(grader),
        }
    }

    pub fn services(&self) -> super::Services {
        super::Services::new(self.retrieval.clone(), self.llm.clone(), self.grader.clone())
    }
}
