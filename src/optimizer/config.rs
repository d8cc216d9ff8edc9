//! Optimization configuration

use serde::{Deserialize, Serialize};

use super::samplers::SamplerType;

/// Direction of optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizeDirection {
    Minimize,
    Maximize,
}

/// Configuration for hyperparameter optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Number of trials to run
    pub n_trials: usize,
    pub direction: OptimizeDirection,
    pub sampler: SamplerType,
    /// Number of initial random samples before the sampler adapts
    pub n_startup_trials: usize,
    pub random_state: Option<u64>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            n_trials: 10,
            direction: OptimizeDirection::Maximize,
            sampler: SamplerType::TPE,
            n_startup_trials: 10,
            random_state: Some(42),
        }
    }
}

impl OptimizationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_direction(mut self, direction: OptimizeDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerType) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }
}
