use super::space::TrialConfig;
use crate::errors::TrialStateError;
use crate::metrics::RunMetrics;
use serde::{Deserialize, Serialize};

/// `CREATED -> RUNNING -> {COMPLETE | PRUNED | FAILED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrialState {
    Created,
    Running,
    Complete,
    Pruned,
    Failed,
}

impl TrialState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Pruned | Self::Failed)
    }

    pub fn transition(self, to: TrialState) -> Result<TrialState, TrialStateError> {
        let ok = matches!(
            (self, to),
            (Self::Created, Self::Running)
                | (Self::Running, Self::Complete)
                | (Self::Running, Self::Pruned)
                | (Self::Running, Self::Failed)
        );
        if ok {
            Ok(to)
        } else {
            Err(TrialStateError { from: self, to })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Pruned => "PRUNED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TrialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted outcome of one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_number: usize,
    pub config: TrialConfig,
    pub fingerprint: String,
    pub state: TrialState,
    /// Final accuracy when COMPLETE, last reported accuracy when PRUNED.
    pub accuracy: Option<f64>,
    /// Metrics over whatever was evaluated before the trial ended.
    pub metrics: Option<RunMetrics>,
    #[serde(default)]
    pub intermediate_values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrialCounts {
    pub total: usize,
    pub complete: usize,
    pub pruned: usize,
    pub failed: usize,
}

impl TrialCounts {
    pub fn from_trials<'a>(trials: impl IntoIterator<Item = &'a TrialResult>) -> Self {
        let mut c = Self::default();
        for t in trials {
            c.total += 1;
            match t.state {
                TrialState::Complete => c.complete += 1,
                TrialState::Pruned => c.pruned += 1,
                TrialState::Failed => c.failed += 1,
                TrialState::Created | TrialState::Running => {}
            }
        }
        c
    }
}

/// Best COMPLETE trial by accuracy; ties go to the lower trial number.
pub fn best_trial(trials: &[TrialResult]) -> Option<&TrialResult> {
    trials
        .iter()
        .filter(|t| t.state == TrialState::Complete)
        .filter_map(|t| t.accuracy.map(|a| (a, t)))
        .max_by(|(a, ta), (b, tb)| a.total_cmp(b).then(tb.trial_number.cmp(&ta.trial_number)))
        .map(|(_, t)| t)
}
