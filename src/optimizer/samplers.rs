//! Sampling strategies for hyperparameter optimization

use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::config::OptimizeDirection;
use super::search_space::{SearchSpace, TrialParams};

/// Type of sampler to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplerType {
    /// Random sampling
    Random,
    /// Tree-structured Parzen Estimator
    TPE,
}

/// Trait for hyperparameter samplers
pub trait Sampler: Send + Sync {
    /// Sample the next set of hyperparameters given completed trials
    fn sample(&mut self, search_space: &SearchSpace, history: &[(TrialParams, f64)]) -> TrialParams;
}

fn seeded(seed: Option<u64>) -> Xoshiro256PlusPlus {
    match seed {
        Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
        None => Xoshiro256PlusPlus::from_entropy(),
    }
}

/// Random sampler
#[derive(Debug)]
pub struct RandomSampler {
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self { rng: seeded(seed) }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, search_space: &SearchSpace, _history: &[(TrialParams, f64)]) -> TrialParams {
        search_space.sample(&mut self.rng)
    }
}

/// Tree-structured Parzen Estimator sampler
///
/// Samples randomly for the first `n_startup_trials`, then draws candidates
/// and keeps the one closest to the best `gamma` fraction of past trials.
#[derive(Debug)]
pub struct TPESampler {
    rng: Xoshiro256PlusPlus,
    direction: OptimizeDirection,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
}

impl TPESampler {
    pub fn new(seed: Option<u64>, direction: OptimizeDirection) -> Self {
        Self {
            rng: seeded(seed),
            direction,
            n_startup_trials: 10,
            gamma: 0.25,
            n_candidates: 24,
        }
    }

    /// Set number of startup trials
    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    fn similarity(search_space: &SearchSpace, candidate: &TrialParams, good: &[&TrialParams]) -> f64 {
        if good.is_empty() {
            return 0.0;
        }

        let total: f64 = good
            .iter()
            .map(|trial| {
                let mut dist = 0.0;
                let mut count = 0;
                for param in search_space.parameters() {
                    if let (Some(a), Some(b)) = (candidate.get(&param.name), trial.get(&param.name)) {
                        let d = param.distance(a, b);
                        dist += d * d;
                        count += 1;
                    }
                }
                if count == 0 {
                    0.0
                } else {
                    1.0 / (1.0 + (dist / count as f64).sqrt())
                }
            })
            .sum();

        total / good.len() as f64
    }
}

impl Sampler for TPESampler {
    fn sample(&mut self, search_space: &SearchSpace, history: &[(TrialParams, f64)]) -> TrialParams {
        if history.len() < self.n_startup_trials {
            return search_space.sample(&mut self.rng);
        }

        // Best trials first
        let mut sorted: Vec<&(TrialParams, f64)> = history.iter().collect();
        sorted.sort_by(|a, b| match self.direction {
            OptimizeDirection::Minimize => a.1.total_cmp(&b.1),
            OptimizeDirection::Maximize => b.1.total_cmp(&a.1),
        });

        let n_good = ((sorted.len() as f64 * self.gamma).ceil() as usize).max(1);
        let good: Vec<&TrialParams> = sorted[..n_good].iter().map(|(p, _)| p).collect();

        let mut best_params = search_space.sample(&mut self.rng);
        let mut best_score = Self::similarity(search_space, &best_params, &good);

        for _ in 1..self.n_candidates {
            let candidate = search_space.sample(&mut self.rng);
            let score = Self::similarity(search_space, &candidate, &good);
            if score > best_score {
                best_score = score;
                best_params = candidate;
            }
        }

        best_params
    }
}

/// Create a sampler from type
pub fn create_sampler(
    sampler_type: SamplerType,
    seed: Option<u64>,
    direction: OptimizeDirection,
    n_startup_trials: usize,
) -> Box<dyn Sampler> {
    match sampler_type {
        SamplerType::Random => Box::new(RandomSampler::new(seed)),
        SamplerType::TPE => Box::new(TPESampler::new(seed, direction).with_n_startup(n_startup_trials)),
    }
}
