//! Hyperparameter optimization
//!
//! A sampler proposes parameter sets from a [`SearchSpace`], an objective
//! scores them and the [`Study`] keeps every trial plus the best one.

mod config;
mod optimizer;
mod samplers;
mod search_space;

pub use config::{OptimizationConfig, OptimizeDirection};
pub use optimizer::{Optimizer, Study, TrialResult};
pub use samplers::{create_sampler, RandomSampler, Sampler, SamplerType, TPESampler};
pub use search_space::{Parameter, ParameterType, ParameterValue, SearchSpace, TrialParams};
