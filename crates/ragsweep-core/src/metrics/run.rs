use super::stats::{mean, DistributionStats};
use crate::model::{CompletenessGrade, EvaluationResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate statistics of one run. Derived purely from its results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub accuracy: f64,
    pub correct_count: usize,
    pub total_count: usize,

    pub completeness_complete_count: usize,
    pub completeness_partial_count: usize,
    pub completeness_insufficient_count: usize,
    /// Results graded without completeness (grading disabled).
    pub completeness_absent_count: usize,
    pub completeness_complete_rate: f64,
    pub completeness_partial_rate: f64,
    pub completeness_insufficient_rate: f64,
    /// Accuracy over results whose context was graded COMPLETE.
    pub accuracy_with_complete_context: Option<f64>,

    pub retrieval_duration: DistributionStats,
    pub response_duration: DistributionStats,
    pub grading_duration: DistributionStats,
    pub total_duration: DistributionStats,
    pub context_tokens: DistributionStats,
    pub context_chars: DistributionStats,

    pub by_category: Vec<GroupBreakdown>,
    pub by_difficulty: Vec<GroupBreakdown>,
}

/// Accuracy and mean stage durations of one category or difficulty value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBreakdown {
    pub key: String,
    pub total_count: usize,
    pub correct_count: usize,
    pub accuracy: f64,
    pub mean_retrieval_duration: f64,
    pub mean_response_duration: f64,
    pub mean_grading_duration: f64,
    pub mean_total_duration: f64,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl RunMetrics {
    pub fn compute(results: &[EvaluationResult]) -> Self {
        let total_count = results.len();
        let correct_count = results.iter().filter(|r| r.is_correct).count();

        let grade_count =
            |g: CompletenessGrade| results.iter().filter(|r| r.completeness_grade == Some(g)).count();
        let complete = grade_count(CompletenessGrade::Complete);
        let partial = grade_count(CompletenessGrade::Partial);
        let insufficient = grade_count(CompletenessGrade::Insufficient);
        let absent = results.iter().filter(|r| r.completeness_grade.is_none()).count();

        let complete_correct = results
            .iter()
            .filter(|r| r.completeness_grade == Some(CompletenessGrade::Complete) && r.is_correct)
            .count();
        let accuracy_with_complete_context = (complete > 0).then(|| ratio(complete_correct, complete));

        let dist = |f: fn(&EvaluationResult) -> f64| {
            let v: Vec<f64> = results.iter().map(f).collect();
            DistributionStats::from_values(&v)
        };

        Self {
            accuracy: ratio(correct_count, total_count),
            correct_count,
            total_count,
            completeness_complete_count: complete,
            completeness_partial_count: partial,
            completeness_insufficient_count: insufficient,
            completeness_absent_count: absent,
            completeness_complete_rate: ratio(complete, total_count),
            completeness_partial_rate: ratio(partial, total_count),
            completeness_insufficient_rate: ratio(insufficient, total_count),
            accuracy_with_complete_context,
            retrieval_duration: dist(|r| r.retrieval_duration),
            response_duration: dist(|r| r.response_duration),
            grading_duration: dist(|r| r.grading_duration),
            total_duration: dist(|r| r.total_duration),
            context_tokens: DistributionStats::from_counts(results.iter().map(|r| r.context_token_count)),
            context_chars: DistributionStats::from_counts(results.iter().map(|r| r.context_char_count)),
            by_category: breakdown(results, category_key),
            by_difficulty: breakdown(results, difficulty_key),
        }
    }
}

fn category_key(r: &EvaluationResult) -> &str {
    &r.category
}

fn difficulty_key(r: &EvaluationResult) -> &str {
    &r.difficulty
}

/// Groups sorted by key.
fn breakdown(results: &[EvaluationResult], key: fn(&EvaluationResult) -> &str) -> Vec<GroupBreakdown> {
    let mut groups: BTreeMap<&str, Vec<&EvaluationResult>> = BTreeMap::new();
    for r in results {
        groups.entry(key(r)).or_default().push(r);
    }
    groups
        .into_iter()
        .map(|(k, rs)| {
            let correct = rs.iter().filter(|r| r.is_correct).count();
            GroupBreakdown {
                key: k.to_string(),
                total_count: rs.len(),
                correct_count: correct,
                accuracy: ratio(correct, rs.len()),
                mean_retrieval_duration: mean(rs.iter().map(|r| r.retrieval_duration)),
                mean_response_duration: mean(rs.iter().map(|r| r.response_duration)),
                mean_grading_duration: mean(rs.iter().map(|r| r.grading_duration)),
                mean_total_duration: mean(rs.iter().map(|r| r.total_duration)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, category: &str, correct: bool, grade: Option<CompletenessGrade>) -> EvaluationResult {
        EvaluationResult {
            test_case_id: id.into(),
            category: category.into(),
            difficulty: "easy".into(),
            query: format!("query {id}"),
            golden_answer: "gold".into(),
            hypothesis: "answer".into(),
            context_text: "ctx".into(),
            context_token_count: 10,
            context_char_count: 40,
            retrieval_duration: 0.5,
            response_duration: 1.0,
            grading_duration: 0.25,
            total_duration: 1.75,
            is_correct: correct,
            correctness_reasoning: String::new(),
            completeness_grade: grade,
            completeness_reasoning: String::new(),
            missing_elements: vec![],
            present_elements: vec![],
            summarization_applied: false,
        }
    }

    #[test]
    fn accuracy_of_mixed_results() {
        let rs = vec![
            result("a", "x", true, None),
            result("b", "x", false, None),
            result("c", "x", true, None),
        ];
        let m = RunMetrics::compute(&rs);
        assert_eq!(m.correct_count, 2);
        assert_eq!(m.total_count, 3);
        assert!((m.accuracy - 0.667).abs() < 1e-3);
        assert_eq!(m.completeness_absent_count, 3);
        assert_eq!(m.accuracy_with_complete_context, None);
    }

    #[test]
    fn conditional_accuracy_over_complete_subset() {
        use CompletenessGrade::*;
        let rs = vec![
            result("a", "x", true, Some(Complete)),
            result("b", "x", false, Some(Complete)),
            result("c", "x", true, Some(Partial)),
            result("d", "x", false, Some(Insufficient)),
        ];
        let m = RunMetrics::compute(&rs);
        assert_eq!(m.completeness_complete_rate, 0.5);
        assert_eq!(m.completeness_partial_rate, 0.25);
        assert_eq!(m.completeness_insufficient_rate, 0.25);
        assert_eq!(m.accuracy_with_complete_context, Some(0.5));
    }

    #[test]
    fn breakdowns_are_sorted_by_key() {
        let rs = vec![
            result("a", "temporal", true, None),
            result("b", "multi-hop", false, None),
            result("c", "temporal", false, None),
        ];
        let m = RunMetrics::compute(&rs);
        let keys: Vec<_> = m.by_category.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["multi-hop", "temporal"]);
        assert_eq!(m.by_category[1].accuracy, 0.5);
        assert_eq!(m.by_category[1].mean_total_duration, 1.75);
        assert_eq!(m.by_difficulty.len(), 1);
    }

    #[test]
    fn empty_results_are_all_zero() {
        let m = RunMetrics::compute(&[]);
        assert_eq!(m, RunMetrics::default());
    }
}
