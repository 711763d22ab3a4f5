//! Point samplers for the sequential search. All are seeded: the same seed
//! and the same history give the same proposals.
//!
//! Objective values are maximized. A sampler only sees finished trials that
//! carry a value (COMPLETE, and PRUNED with their last reported value).

use super::study::FrozenTrial;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

pub trait Sampler: Send {
    /// One index per parameter, each below the matching cardinality.
    fn sample(&mut self, cardinalities: &[usize], history: &[FrozenTrial]) -> Vec<usize>;

    fn name(&self) -> &'static str;
}

fn random_point(rng: &mut StdRng, cardinalities: &[usize]) -> Vec<usize> {
    cardinalities
        .iter()
        .map(|&k| if k <= 1 { 0 } else { rng.gen_range(0..k) })
        .collect()
}

fn observed(history: &[FrozenTrial]) -> Vec<(&[usize], f64)> {
    history
        .iter()
        .filter_map(|t| t.value.map(|v| (t.params.as_slice(), v)))
        .collect()
}

pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, cardinalities: &[usize], _history: &[FrozenTrial]) -> Vec<usize> {
        random_point(&mut self.rng, cardinalities)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Tree-structured Parzen estimator over categorical parameters.
///
/// Observations are split into the best `gamma` fraction ("good") and the
/// rest ("bad"). Per parameter, smoothed category frequencies give l(x) for
/// good and g(x) for bad. Candidates are drawn from l and the one maximizing
/// `sum(log l - log g)` is proposed.
pub struct TpeSampler {
    rng: StdRng,
    pub n_startup_trials: usize,
    pub gamma: f64,
    pub n_ei_candidates: usize,
    pub prior_weight: f64,
}

impl TpeSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            n_startup_trials: 5,
            gamma: 0.25,
            n_ei_candidates: 24,
            prior_weight: 1.0,
        }
    }

    pub fn with_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Smoothed category probabilities of one parameter in `group`.
    fn parzen(&self, group: &[&[usize]], param: usize, k: usize) -> Vec<f64> {
        let mut counts = vec![self.prior_weight / k as f64; k];
        for point in group {
            if let Some(c) = counts.get_mut(point[param]) {
                *c += 1.0;
            }
        }
        let total: f64 = counts.iter().sum();
        counts.into_iter().map(|c| c / total).collect()
    }
}

impl Sampler for TpeSampler {
    fn sample(&mut self, cardinalities: &[usize], history: &[FrozenTrial]) -> Vec<usize> {
        let mut obs = observed(history);
        if obs.len() < self.n_startup_trials.max(2) {
            debug!(observed = obs.len(), sampler = "tpe", "not enough history, sampling at random");
            return random_point(&mut self.rng, cardinalities);
        }
        // Best first; stable, so earlier trials win ties.
        obs.sort_by(|a, b| b.1.total_cmp(&a.1));
        let n_good = ((self.gamma * obs.len() as f64).ceil() as usize).clamp(1, obs.len() - 1);
        let good: Vec<&[usize]> = obs[..n_good].iter().map(|(p, _)| *p).collect();
        let bad: Vec<&[usize]> = obs[n_good..].iter().map(|(p, _)| *p).collect();

        let mut l = Vec::with_capacity(cardinalities.len());
        let mut g = Vec::with_capacity(cardinalities.len());
        for (param, &k) in cardinalities.iter().enumerate() {
            l.push(self.parzen(&good, param, k.max(1)));
            g.push(self.parzen(&bad, param, k.max(1)));
        }

        let mut best: Option<(f64, Vec<usize>)> = None;
        for _ in 0..self.n_ei_candidates.max(1) {
            let mut candidate = Vec::with_capacity(cardinalities.len());
            let mut score = 0.0;
            for param in 0..cardinalities.len() {
                let idx = match WeightedIndex::new(&l[param]) {
                    Ok(dist) => dist.sample(&mut self.rng),
                    Err(_) => self.rng.gen_range(0..l[param].len()),
                };
                score += l[param][idx].ln() - g[param][idx].ln();
                candidate.push(idx);
            }
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, candidate));
            }
        }
        match best {
            Some((_, point)) => point,
            None => random_point(&mut self.rng, cardinalities),
        }
    }

    fn name(&self) -> &'static str {
        "tpe"
    }
}

/// Depth-one regression trees: per parameter, a split on each category
/// predicts the mean objective of the trials in that leaf. The leaf with the
/// highest mean plus an exploration bonus `c * sqrt(ln N / n_leaf)` wins;
/// empty leaves are explored first.
pub struct TreeSampler {
    rng: StdRng,
    pub n_startup_trials: usize,
    pub exploration: f64,
}

impl TreeSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            n_startup_trials: 3,
            exploration: 0.5,
        }
    }

    pub fn with_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    fn pick(&mut self, obs: &[(&[usize], f64)], param: usize, k: usize) -> usize {
        let mut sums = vec![0.0; k];
        let mut counts = vec![0usize; k];
        for (point, v) in obs {
            if let Some(i) = point.get(param).copied().filter(|&i| i < k) {
                sums[i] += v;
                counts[i] += 1;
            }
        }
        let unseen: Vec<usize> = (0..k).filter(|&i| counts[i] == 0).collect();
        if !unseen.is_empty() {
            return unseen[self.rng.gen_range(0..unseen.len())];
        }
        let n = obs.len().max(1) as f64;
        let scores: Vec<f64> = (0..k)
            .map(|i| {
                let c = counts[i] as f64;
                sums[i] / c + self.exploration * (n.ln() / c).sqrt()
            })
            .collect();
        let top = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let leaders: Vec<usize> = (0..k).filter(|&i| scores[i] >= top - 1e-12).collect();
        leaders[self.rng.gen_range(0..leaders.len())]
    }
}

impl Sampler for TreeSampler {
    fn sample(&mut self, cardinalities: &[usize], history: &[FrozenTrial]) -> Vec<usize> {
        let obs = observed(history);
        if obs.len() < self.n_startup_trials {
            debug!(observed = obs.len(), sampler = "tree", "not enough history, sampling at random");
            return random_point(&mut self.rng, cardinalities);
        }
        cardinalities
            .iter()
            .enumerate()
            .map(|(param, &k)| if k <= 1 { 0 } else { self.pick(&obs, param, k) })
            .collect()
    }

    fn name(&self) -> &'static str {
        "tree"
    }
}
