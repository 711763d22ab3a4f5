//! Sequential ask/tell study over a [`SearchSpace`].
//!
//! `ask` hands out an owned [`RunningTrial`]; `tell` consumes it. A trial
//! cannot be told twice and every asked trial must be told once for the
//! study to stay balanced.

use super::pruner::Pruner;
use super::sampler::Sampler;
use super::space::{SearchSpace, TrialConfig};
use super::trial::TrialState;
use crate::errors::{ConfigError, TrialStateError};
use anyhow::anyhow;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use tracing::debug;

/// Sampler attempts before falling back to an unevaluated grid point.
const MAX_RESAMPLE: usize = 8;

/// A finished trial as the sampler and pruner see it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenTrial {
    pub number: usize,
    pub params: Vec<usize>,
    pub state: TrialState,
    /// COMPLETE: final value. PRUNED: last reported value. FAILED: none.
    pub value: Option<f64>,
    pub intermediate_values: Vec<f64>,
}

#[derive(Debug)]
pub struct RunningTrial {
    number: usize,
    params: Vec<usize>,
    config: TrialConfig,
    state: TrialState,
    intermediate_values: Vec<f64>,
}

impl RunningTrial {
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn params(&self) -> &[usize] {
        &self.params
    }

    pub fn config(&self) -> &TrialConfig {
        &self.config
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn intermediate_values(&self) -> &[f64] {
        &self.intermediate_values
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialOutcome {
    Complete(f64),
    Pruned,
    Failed,
}

impl TrialOutcome {
    fn state(self) -> TrialState {
        match self {
            Self::Complete(_) => TrialState::Complete,
            Self::Pruned => TrialState::Pruned,
            Self::Failed => TrialState::Failed,
        }
    }
}

pub struct Study {
    space: SearchSpace,
    cardinalities: Vec<usize>,
    sampler: Box<dyn Sampler>,
    pruner: Box<dyn Pruner>,
    history: Vec<FrozenTrial>,
    seen: HashSet<Vec<usize>>,
    rng: StdRng,
    asks: usize,
    tells: usize,
}

impl Study {
    pub fn new(
        space: SearchSpace,
        sampler: Box<dyn Sampler>,
        pruner: Box<dyn Pruner>,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        space.validate()?;
        let cardinalities = space.cardinalities();
        Ok(Self {
            space,
            cardinalities,
            sampler,
            pruner,
            history: Vec::new(),
            seen: HashSet::new(),
            rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
            asks: 0,
            tells: 0,
        })
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn sampler_name(&self) -> &'static str {
        self.sampler.name()
    }

    pub fn pruner_name(&self) -> &'static str {
        self.pruner.name()
    }

    /// Finished trials, in tell order.
    pub fn history(&self) -> &[FrozenTrial] {
        &self.history
    }

    pub fn asks(&self) -> usize {
        self.asks
    }

    pub fn tells(&self) -> usize {
        self.tells
    }

    fn propose(&mut self) -> Vec<usize> {
        for _ in 0..MAX_RESAMPLE {
            let point = self.sampler.sample(&self.cardinalities, &self.history);
            if !self.seen.contains(&point) {
                return point;
            }
        }
        let fresh: Vec<Vec<usize>> = self
            .space
            .grid_points()
            .into_iter()
            .filter(|p| !self.seen.contains(p))
            .collect();
        if fresh.is_empty() {
            debug!(trial = self.asks, "search space exhausted, repeating a configuration");
            return self.sampler.sample(&self.cardinalities, &self.history);
        }
        debug!(
            trial = self.asks,
            sampler = self.sampler.name(),
            "sampler kept proposing evaluated configurations, picking an unevaluated one at random"
        );
        let pick = self.rng.gen_range(0..fresh.len());
        fresh.into_iter().nth(pick).unwrap_or_default()
    }

    pub fn ask(&mut self) -> anyhow::Result<RunningTrial> {
        let params = self.propose();
        let config = self
            .space
            .config_at(&params)
            .ok_or_else(|| anyhow!("sampler proposed a point outside the space: {params:?}"))?;
        let state = TrialState::Created.transition(TrialState::Running)?;
        self.seen.insert(params.clone());
        let number = self.asks;
        self.asks += 1;
        Ok(RunningTrial {
            number,
            params,
            config,
            state,
            intermediate_values: Vec::new(),
        })
    }

    /// Records the accuracy after one more batch.
    pub fn report(&self, trial: &mut RunningTrial, value: f64) {
        trial.intermediate_values.push(value);
    }

    pub fn should_prune(&self, trial: &RunningTrial) -> bool {
        self.pruner.should_prune(&trial.intermediate_values, &self.history)
    }

    pub fn tell(&mut self, trial: RunningTrial, outcome: TrialOutcome) -> Result<FrozenTrial, TrialStateError> {
        let state = trial.state.transition(outcome.state())?;
        let value = match outcome {
            TrialOutcome::Complete(v) => Some(v),
            TrialOutcome::Pruned => trial.intermediate_values.last().copied(),
            TrialOutcome::Failed => None,
        };
        let frozen = FrozenTrial {
            number: trial.number,
            params: trial.params,
            state,
            value,
            intermediate_values: trial.intermediate_values,
        };
        self.history.push(frozen.clone());
        self.tells += 1;
        Ok(frozen)
    }
}
