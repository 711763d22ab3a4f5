//! Human-readable renderings of persisted metrics. Pure string builders;
//! the CLI decides where they go.

use crate::metrics::{DistributionStats, ExperimentRecord, GroupBreakdown, RunMetrics};
use crate::search::{SearchSummary, TrialCounts, TrialResult};
use std::fmt::Write;

fn pct(x: f64) -> String {
    format!("{:.1}%", x * 100.0)
}

fn opt_pct(x: Option<f64>) -> String {
    x.map(pct).unwrap_or_else(|| "-".into())
}

fn duration_line(out: &mut String, label: &str, d: &DistributionStats) {
    let _ = writeln!(
        out,
        "  {:<12} mean {:>7.3}s  p50 {:>7.3}s  p95 {:>7.3}s  max {:>7.3}s",
        label, d.mean, d.p50, d.p95, d.max
    );
}

fn breakdown(out: &mut String, title: &str, groups: &[GroupBreakdown]) {
    if groups.is_empty() {
        return;
    }
    let _ = writeln!(out, "{title}:");
    for g in groups {
        let _ = writeln!(
            out,
            "  {:<20} {:>7}  ({}/{})  mean total {:.3}s",
            g.key,
            pct(g.accuracy),
            g.correct_count,
            g.total_count,
            g.mean_total_duration
        );
    }
}

#[must_use]
pub fn format_run_summary(label: &str, m: &RunMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run {label}");
    let _ = writeln!(
        out,
        "Accuracy: {} ({}/{})",
        pct(m.accuracy),
        m.correct_count,
        m.total_count
    );
    let _ = writeln!(
        out,
        "Context completeness: complete {} / partial {} / insufficient {} ({} ungraded)",
        pct(m.completeness_complete_rate),
        pct(m.completeness_partial_rate),
        pct(m.completeness_insufficient_rate),
        m.completeness_absent_count
    );
    let _ = writeln!(
        out,
        "Accuracy with complete context: {}",
        opt_pct(m.accuracy_with_complete_context)
    );
    let _ = writeln!(out, "Durations:");
    duration_line(&mut out, "retrieval", &m.retrieval_duration);
    duration_line(&mut out, "response", &m.response_duration);
    duration_line(&mut out, "grading", &m.grading_duration);
    duration_line(&mut out, "total", &m.total_duration);
    let _ = writeln!(
        out,
        "Context size: mean {:.0} tokens, p95 {:.0} tokens",
        m.context_tokens.mean, m.context_tokens.p95
    );
    breakdown(&mut out, "By category", &m.by_category);
    breakdown(&mut out, "By difficulty", &m.by_difficulty);
    out
}

#[must_use]
pub fn format_experiment(record: &ExperimentRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Experiment {} ({} runs)", record.experiment_id, record.num_runs);
    let _ = writeln!(out, "Per-run:");
    for (name, s) in &record.per_run {
        if s.count == 0 {
            continue;
        }
        let _ = writeln!(
            out,
            "  {:<32} mean {:.4}  std {:.4}  min {:.4}  max {:.4}",
            name, s.mean, s.std_dev, s.min, s.max
        );
    }
    let _ = writeln!(out, "Pooled over {} results:", record.pooled.total_count);
    let _ = writeln!(out, "  accuracy {}", pct(record.pooled.accuracy));
    duration_line(&mut out, "response", &record.pooled.response_duration);
    duration_line(&mut out, "total", &record.pooled.total_duration);
    out
}

fn counts_line(c: &TrialCounts) -> String {
    format!(
        "{} trials: {} complete, {} pruned, {} failed",
        c.total, c.complete, c.pruned, c.failed
    )
}

fn trial_line(out: &mut String, t: &TrialResult) {
    let _ = writeln!(
        out,
        "  #{:<4} {:<9} {:>7}  {}",
        t.trial_number,
        t.state.as_str(),
        opt_pct(t.accuracy),
        t.config.slug()
    );
}

#[must_use]
pub fn format_search_summary(summary: &SearchSummary) -> String {
    let mut out = String::new();
    let (trials, best_number, best_accuracy) = match summary {
        SearchSummary::Grid(g) => {
            let _ = writeln!(out, "Grid search {} ({} points)", g.search_id, g.grid_size);
            let _ = writeln!(out, "{}", counts_line(&g.counts));
            (&g.trials, g.best_trial_number, g.best_accuracy)
        }
        SearchSummary::Bayesian(b) => {
            let _ = writeln!(
                out,
                "Bayesian search {} (sampler {}, pruner {}, seed {})",
                b.search_id, b.sampler, b.pruner, b.seed
            );
            let _ = writeln!(out, "{}", counts_line(&b.counts));
            (&b.trials, b.best_trial_number, b.best_accuracy)
        }
    };
    match best_number {
        Some(n) => {
            let _ = writeln!(out, "Best: trial #{n} at {}", opt_pct(best_accuracy));
        }
        None => {
            let _ = writeln!(out, "Best: none (no trial completed)");
        }
    }
    for t in trials {
        trial_line(&mut out, t);
    }
    out
}
