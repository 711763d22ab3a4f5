//! Progress reporting for runs. The runner emits one event per finished
//! unit, in completion order, to an optional caller sink and to the debug log.

use std::sync::Arc;

/// How many units of the run have finished so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Finished units, successful or not.
    pub done: usize,
    pub total: usize,
    /// Running count of correct answers.
    pub correct: usize,
    pub failed: usize,
}

impl ProgressEvent {
    /// Accuracy over the units that produced a result so far.
    pub fn running_accuracy(&self) -> f64 {
        let graded = self.done - self.failed;
        if graded == 0 {
            0.0
        } else {
            self.correct as f64 / graded as f64
        }
    }
}

pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

#[must_use]
pub fn format_progress_line(ev: &ProgressEvent) -> String {
    let mut line = format!(
        "Evaluated {}/{} (accuracy so far {:.1}%)",
        ev.done,
        ev.total,
        ev.running_accuracy() * 100.0
    );
    if ev.failed > 0 {
        line.push_str(&format!(", {} failed", ev.failed));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line_mentions_failures_only_when_present() {
        let ev = ProgressEvent {
            done: 4,
            total: 10,
            correct: 3,
            failed: 0,
        };
        assert_eq!(format_progress_line(&ev), "Evaluated 4/10 (accuracy so far 75.0%)");
        let ev = ProgressEvent {
            correct: 1,
            failed: 2,
            ..ev
        };
        assert_eq!(
            format_progress_line(&ev),
            "Evaluated 4/10 (accuracy so far 50.0%), 2 failed"
        );
    }

    #[test]
    fn running_accuracy_ignores_failed_units() {
        let ev = ProgressEvent {
            done: 3,
            total: 3,
            correct: 0,
            failed: 3,
        };
        assert_eq!(ev.running_accuracy(), 0.0);
    }
}
