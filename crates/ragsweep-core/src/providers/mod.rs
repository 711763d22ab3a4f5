//! Collaborator capabilities consumed by the evaluation pipeline.
//!
//! Implementations live outside this crate (HTTP clients for the graph
//! service and the LLM provider); the pipeline only sees these traits.
//! Handles are constructed by the driver and injected as `Arc<dyn _>`.

pub mod fake;

use crate::errors::ProviderError;
use crate::model::{RerankerKind, RetrievedItem, Scope, ScopedItems, SummarizationStrategy};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub graph_id: String,
    pub query: String,
    pub scope: Scope,
    /// `None` asks the service for its default ordering.
    pub reranker: Option<RerankerKind>,
    pub limit: usize,
}

#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievedItem>, ProviderError>;

    /// Whether the service can apply `reranker` itself for `scope`.
    fn supports_reranker(&self, scope: Scope, reranker: RerankerKind) -> bool;

    /// Hard cap on `limit` per request.
    fn max_limit(&self) -> usize {
        50
    }

    fn provider_name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub temperature: f32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    /// JSON schema the structured result must follow.
    pub schema: serde_json::Value,
}

/// Structured grading. Used for both correctness and completeness, each
/// with its own prompt and schema.
#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade(&self, request: &GradeRequest) -> Result<serde_json::Value, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

/// Local relevance reordering for rerankers the retrieval service lacks.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        kind: RerankerKind,
        query: &str,
        items: Vec<RetrievedItem>,
        top_k: usize,
    ) -> Result<Vec<RetrievedItem>, ProviderError>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        strategy: SummarizationStrategy,
        query: &str,
        context: &str,
        model: &str,
    ) -> Result<String, ProviderError>;
}

/// Turns retrieved items into the prompt context. Pure.
pub trait ContextComposer: Send + Sync {
    fn compose(&self, query: &str, scoped: &[ScopedItems]) -> String;

    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Sectioned plain-text context: one heading per scope, one line per item.
#[derive(Debug, Clone, Default)]
pub struct PlainComposer;

impl ContextComposer for PlainComposer {
    fn compose(&self, _query: &str, scoped: &[ScopedItems]) -> String {
        let mut out = String::new();
        for group in scoped {
            if group.items.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("# {}\n", group.scope.as_str().to_uppercase()));
            for item in &group.items {
                let line = match item {
                    RetrievedItem::Fact {
                        text,
                        valid_from,
                        valid_to,
                    } => {
                        let from = valid_from.as_deref().unwrap_or("?");
                        let to = valid_to.as_deref().unwrap_or("present");
                        format!("- {text} ({from} - {to})")
                    }
                    RetrievedItem::Entity {
                        name,
                        summary,
                        attributes,
                    } => {
                        if attributes.is_empty() {
                            format!("- {name}: {summary}")
                        } else {
                            let attrs = attributes
                                .iter()
                                .map(|(k, v)| format!("{k}={v}"))
                                .collect::<Vec<_>>()
                                .join(", ");
                            format!("- {name}: {summary} [{attrs}]")
                        }
                    }
                    RetrievedItem::Episode { content } => format!("- {content}"),
                };
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}

/// Client handles shared by every unit of a run (and every trial of a sweep).
#[derive(Clone)]
pub struct Services {
    pub retrieval: Arc<dyn RetrievalClient>,
    pub llm: Arc<dyn LlmClient>,
    pub grader: Arc<dyn Grader>,
    pub composer: Arc<dyn ContextComposer>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub summarizer: Option<Arc<dyn Summarizer>>,
}

impl Services {
    pub fn new(
        retrieval: Arc<dyn RetrievalClient>,
        llm: Arc<dyn LlmClient>,
        grader: Arc<dyn Grader>,
    ) -> Self {
        Self {
            retrieval,
            llm,
            grader,
            composer: Arc::new(PlainComposer),
            reranker: None,
            summarizer: None,
        }
    }

    pub fn with_composer(mut self, composer: Arc<dyn ContextComposer>) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }
}
