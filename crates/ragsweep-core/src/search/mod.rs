//! Hyperparameter search over pipeline configurations.
//!
//! [`GridSearch`] tries every point of the [`SearchSpace`];
//! [`BayesianSearch`] drives a [`Study`] with a pluggable [`Sampler`] and
//! [`Pruner`]. Both evaluate points through a [`TrialExecutor`] and persist
//! per-trial artifacts plus a top-level summary.

pub mod artifacts;
pub mod bayes;
pub mod executor;
pub mod grid;
pub mod pruner;
pub mod sampler;
pub mod space;
pub mod study;
pub mod trial;

pub use artifacts::{load_search_summary, load_trials, SearchArtifacts, SearchSummary};
pub use bayes::{BayesianOutcome, BayesianSearch, BayesianSummary};
pub use executor::{PipelineExecutor, TrialExecutor};
pub use grid::{GridOutcome, GridSearch, GridSummary};
pub use pruner::{MedianPruner, NopPruner, Pruner};
pub use sampler::{RandomSampler, Sampler, TpeSampler, TreeSampler};
pub use space::{SearchSpace, TrialConfig};
pub use study::{FrozenTrial, RunningTrial, Study, TrialOutcome};
pub use trial::{TrialCounts, TrialResult, TrialState};

use crate::config::{BayesianConfig, PrunerConfig, PrunerKind, SamplerKind};

pub fn build_sampler(cfg: &BayesianConfig) -> Box<dyn Sampler> {
    match (cfg.sampler, cfg.sampler_startup_trials) {
        (SamplerKind::Random, _) => Box::new(RandomSampler::new(cfg.seed)),
        (SamplerKind::Tpe, None) => Box::new(TpeSampler::new(cfg.seed)),
        (SamplerKind::Tpe, Some(n)) => Box::new(TpeSampler::new(cfg.seed).with_startup_trials(n)),
        (SamplerKind::Tree, None) => Box::new(TreeSampler::new(cfg.seed)),
        (SamplerKind::Tree, Some(n)) => Box::new(TreeSampler::new(cfg.seed).with_startup_trials(n)),
    }
}

pub fn build_pruner(cfg: &PrunerConfig) -> Box<dyn Pruner> {
    match cfg.kind {
        PrunerKind::None => Box::new(NopPruner),
        PrunerKind::Median => Box::new(MedianPruner {
            n_startup_trials: cfg.n_startup_trials,
            n_warmup_steps: cfg.n_warmup_steps,
        }),
    }
}
