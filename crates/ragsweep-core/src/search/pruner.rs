//! Early-stopping policies for trials that report intermediate accuracy.

use super::study::FrozenTrial;
use super::trial::TrialState;

pub trait Pruner: Send + Sync {
    /// `intermediate` holds every value the running trial reported so far,
    /// one per batch, in order.
    fn should_prune(&self, intermediate: &[f64], history: &[FrozenTrial]) -> bool;

    fn name(&self) -> &'static str;
}

pub struct NopPruner;

impl Pruner for NopPruner {
    fn should_prune(&self, _intermediate: &[f64], _history: &[FrozenTrial]) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Prunes a trial whose latest value is below the median of the COMPLETE
/// trials' values at the same step.
#[derive(Debug, Clone, Copy)]
pub struct MedianPruner {
    /// COMPLETE trials required before anything is pruned.
    pub n_startup_trials: usize,
    /// Steps a trial may report before it can be pruned.
    pub n_warmup_steps: usize,
}

impl Default for MedianPruner {
    fn default() -> Self {
        Self {
            n_startup_trials: 5,
            n_warmup_steps: 1,
        }
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

impl Pruner for MedianPruner {
    fn should_prune(&self, intermediate: &[f64], history: &[FrozenTrial]) -> bool {
        let Some(&latest) = intermediate.last() else {
            return false;
        };
        if intermediate.len() <= self.n_warmup_steps {
            return false;
        }
        let complete: Vec<&FrozenTrial> = history
            .iter()
            .filter(|t| t.state == TrialState::Complete)
            .collect();
        if complete.len() < self.n_startup_trials {
            return false;
        }
        let step = intermediate.len() - 1;
        let mut peers: Vec<f64> = complete
            .iter()
            .filter_map(|t| t.intermediate_values.get(step).copied())
            .collect();
        match median(&mut peers) {
            Some(m) => latest < m,
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "median"
    }
}
