use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One question/golden-answer pair. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    /// Conversation/graph identifier the dataset groups cases by; retrieval
    /// is scoped to it.
    #[serde(default)]
    pub graph_id: String,
    pub category: String,
    pub difficulty: String,
    pub query: String,
    pub golden_answer: String,
}

/// Retrieval scope of the external memory/graph service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Entities,
    Facts,
    Episodes,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Entities => "entities",
            Scope::Facts => "facts",
            Scope::Episodes => "episodes",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relevance reordering applied before truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RerankerKind {
    #[default]
    None,
    Rrf,
    Mmr,
    CrossEncoder,
    NodeDistance,
    EpisodeMentions,
}

impl RerankerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RerankerKind::None => "none",
            RerankerKind::Rrf => "rrf",
            RerankerKind::Mmr => "mmr",
            RerankerKind::CrossEncoder => "cross_encoder",
            RerankerKind::NodeDistance => "node_distance",
            RerankerKind::EpisodeMentions => "episode_mentions",
        }
    }
}

impl std::fmt::Display for RerankerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context post-processing before generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SummarizationStrategy {
    #[default]
    None,
    Concise,
    QueryFocused,
}

impl SummarizationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummarizationStrategy::None => "none",
            SummarizationStrategy::Concise => "concise",
            SummarizationStrategy::QueryFocused => "query_focused",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, SummarizationStrategy::None)
    }
}

impl std::fmt::Display for SummarizationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item returned by the retrieval service. Order within a scope is rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrievedItem {
    Fact {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        valid_from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        valid_to: Option<String>,
    },
    Entity {
        name: String,
        summary: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
    Episode {
        content: String,
    },
}

impl RetrievedItem {
    /// Text used for local reranking and prompts.
    pub fn primary_text(&self) -> &str {
        match self {
            RetrievedItem::Fact { text, .. } => text,
            RetrievedItem::Entity { summary, .. } => summary,
            RetrievedItem::Episode { content } => content,
        }
    }
}

/// Items retrieved for one scope, in final (possibly reranked) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedItems {
    pub scope: Scope,
    pub items: Vec<RetrievedItem>,
}

/// Whether the retrieved context holds enough to answer the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletenessGrade {
    Complete,
    Partial,
    Insufficient,
}

impl CompletenessGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletenessGrade::Complete => "COMPLETE",
            CompletenessGrade::Partial => "PARTIAL",
            CompletenessGrade::Insufficient => "INSUFFICIENT",
        }
    }
}

/// Structured verdict of the correctness grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectnessVerdict {
    pub is_correct: bool,
    #[serde(default)]
    pub reasoning: String,
}

/// Structured verdict of the completeness grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessVerdict {
    pub grade: CompletenessGrade,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub missing_elements: Vec<String>,
    #[serde(default)]
    pub present_elements: Vec<String>,
}

/// Outcome of one test case. Created once by an evaluation unit, never mutated.
/// Durations are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub test_case_id: String,
    pub category: String,
    pub difficulty: String,
    pub query: String,
    pub golden_answer: String,
    pub hypothesis: String,
    pub context_text: String,
    pub context_token_count: usize,
    pub context_char_count: usize,
    /// Seconds spent on search calls, including local reranking of the
    /// over-fetched items. Zero in baseline mode.
    pub retrieval_duration: f64,
    /// Seconds spent generating the answer.
    pub response_duration: f64,
    /// Seconds spent on correctness grading.
    #[serde(default)]
    pub grading_duration: f64,
    /// Wall clock of the whole unit, retrieval through correctness grading.
    pub total_duration: f64,
    pub is_correct: bool,
    pub correctness_reasoning: String,
    pub completeness_grade: Option<CompletenessGrade>,
    #[serde(default)]
    pub completeness_reasoning: String,
    #[serde(default)]
    pub missing_elements: Vec<String>,
    #[serde(default)]
    pub present_elements: Vec<String>,
    #[serde(default)]
    pub summarization_applied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieved_item_is_tagged_by_kind() {
        let item = RetrievedItem::Fact {
            text: "Alice moved to Paris".into(),
            valid_from: Some("2023-04-01T00:00:00Z".into()),
            valid_to: None,
        };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["kind"], "fact");
        assert!(v.get("valid_to").is_none());

        let back: RetrievedItem =
            serde_json::from_str(r#"{"kind":"episode","content":"hi"}"#).unwrap();
        assert_eq!(back.primary_text(), "hi");
    }

    #[test]
    fn completeness_grade_wire_names() {
        let v = serde_json::to_value(CompletenessGrade::Insufficient).unwrap();
        assert_eq!(v, "INSUFFICIENT");
        let g: CompletenessGrade = serde_json::from_str("\"PARTIAL\"").unwrap();
        assert_eq!(g, CompletenessGrade::Partial);
    }

    #[test]
    fn unknown_reranker_is_rejected() {
        let r: Result<RerankerKind, _> = serde_json::from_str("\"bm42\"");
        assert!(r.is_err());
        let ok: RerankerKind = serde_json::from_str("\"cross_encoder\"").unwrap();
        assert_eq!(ok, RerankerKind::CrossEncoder);
    }
}
