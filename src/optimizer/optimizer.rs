//! Trial loop and study bookkeeping

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::{OptimizationConfig, OptimizeDirection};
use super::samplers::{create_sampler, Sampler};
use super::search_space::{SearchSpace, TrialParams};
use crate::error::Result;

/// Result of a single trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: usize,
    pub params: TrialParams,
    /// Objective value, absent when the trial failed
    pub value: Option<f64>,
    pub duration_secs: f64,
    /// Whether the trial was abandoned
    pub pruned: bool,
    /// Failure reason for pruned trials
    pub error: Option<String>,
    /// Additional metrics
    pub metrics: BTreeMap<String, f64>,
}

/// Study containing all trials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub trials: Vec<TrialResult>,
    pub best_trial_idx: Option<usize>,
    pub total_duration_secs: f64,
    pub direction: OptimizeDirection,
}

impl Study {
    pub fn new(direction: OptimizeDirection) -> Self {
        Self {
            trials: Vec::new(),
            best_trial_idx: None,
            total_duration_secs: 0.0,
            direction,
        }
    }

    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.best_trial_idx.map(|idx| &self.trials[idx])
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().and_then(|t| t.value)
    }

    pub fn best_params(&self) -> Option<&TrialParams> {
        self.best_trial().map(|t| &t.params)
    }

    /// Trials that produced a value
    pub fn completed_trials(&self) -> impl Iterator<Item = &TrialResult> {
        self.trials.iter().filter(|t| !t.pruned)
    }

    pub fn n_pruned(&self) -> usize {
        self.trials.iter().filter(|t| t.pruned).count()
    }

    /// Add a trial result.
    ///
    /// A trial only replaces the best when strictly better, so the earliest
    /// trial wins ties. Pruned trials never become best.
    pub fn add_trial(&mut self, result: TrialResult) {
        let idx = self.trials.len();

        if let (false, Some(value)) = (result.pruned, result.value) {
            let is_better = match self.best_value() {
                None => true,
                Some(best) => match self.direction {
                    OptimizeDirection::Minimize => value < best,
                    OptimizeDirection::Maximize => value > best,
                },
            };
            if is_better {
                self.best_trial_idx = Some(idx);
            }
        }

        self.trials.push(result);
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Hyperparameter optimizer driving a sampler over a search space
pub struct Optimizer {
    config: OptimizationConfig,
    search_space: SearchSpace,
    sampler: Box<dyn Sampler>,
    study: Study,
}

impl Optimizer {
    pub fn new(config: OptimizationConfig, search_space: SearchSpace) -> Self {
        let sampler = create_sampler(
            config.sampler,
            config.random_state,
            config.direction,
            config.n_startup_trials,
        );
        let study = Study::new(config.direction);

        Self {
            config,
            search_space,
            sampler,
            study,
        }
    }

    /// Run exactly `n_trials` trials.
    ///
    /// An objective error marks that trial pruned and the loop continues.
    pub fn optimize<F>(&mut self, mut objective: F) -> Result<&Study>
    where
        F: FnMut(&TrialParams) -> Result<f64>,
    {
        let start = Instant::now();
        let mut history: Vec<(TrialParams, f64)> = Vec::new();

        for trial_id in 0..self.config.n_trials {
            let trial_start = Instant::now();
            let params = self.sampler.sample(&self.search_space, &history);

            let result = match objective(&params) {
                Ok(value) => {
                    history.push((params.clone(), value));
                    TrialResult {
                        trial_id,
                        params,
                        value: Some(value),
                        duration_secs: trial_start.elapsed().as_secs_f64(),
                        pruned: false,
                        error: None,
                        metrics: BTreeMap::new(),
                    }
                }
                Err(e) => {
                    warn!(trial = trial_id, error = %e, "Trial failed, marking pruned");
                    TrialResult {
                        trial_id,
                        params,
                        value: None,
                        duration_secs: trial_start.elapsed().as_secs_f64(),
                        pruned: true,
                        error: Some(e.to_string()),
                        metrics: BTreeMap::new(),
                    }
                }
            };

            self.study.add_trial(result);
            debug!(
                trial = trial_id,
                value = ?self.study.trials[trial_id].value,
                best = ?self.study.best_value(),
                "Trial finished"
            );
        }

        self.study.total_duration_secs = start.elapsed().as_secs_f64();
        Ok(&self.study)
    }

    pub fn study(&self) -> &Study {
        &self.study
    }

    pub fn into_study(self) -> Study {
        self.study
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IrisError;
    use crate::optimizer::samplers::SamplerType;

    fn quadratic_objective(params: &TrialParams) -> Result<f64> {
        let x = params.get("x").and_then(|p| p.as_float()).unwrap_or(0.0);
        let y = params.get("y").and_then(|p| p.as_float()).unwrap_or(0.0);
        Ok(x * x + y * y)
    }

    fn trial(value: Option<f64>, pruned: bool) -> TrialResult {
        TrialResult {
            trial_id: 0,
            params: TrialParams::new(),
            value,
            duration_secs: 0.0,
            pruned,
            error: None,
            metrics: BTreeMap::new(),
        }
    }

    #[test]
    fn test_optimization_minimize() {
        let config = OptimizationConfig::new()
            .with_n_trials(20)
            .with_direction(OptimizeDirection::Minimize);
        let space = SearchSpace::new().float("x", -5.0, 5.0).float("y", -5.0, 5.0);

        let mut optimizer = Optimizer::new(config, space);
        let study = optimizer.optimize(quadratic_objective).unwrap();

        assert_eq!(study.trials.len(), 20);
        let best = study.best_value().unwrap();
        assert!(study.completed_trials().all(|t| t.value.unwrap() >= best));
    }

    #[test]
    fn test_ties_keep_first_trial() {
        let mut study = Study::new(OptimizeDirection::Maximize);
        study.add_trial(trial(Some(0.9), false));
        study.add_trial(trial(Some(0.95), false));
        study.add_trial(trial(Some(0.95), false));
        assert_eq!(study.best_trial_idx, Some(1));
    }

    #[test]
    fn test_pruned_never_best() {
        let mut study = Study::new(OptimizeDirection::Maximize);
        study.add_trial(trial(None, true));
        assert!(study.best_trial().is_none());
        study.add_trial(trial(Some(0.1), false));
        assert_eq!(study.best_trial_idx, Some(1));
        assert_eq!(study.n_pruned(), 1);
    }

    #[test]
    fn test_failed_objective_is_pruned() {
        let config = OptimizationConfig::new()
            .with_n_trials(6)
            .with_sampler(SamplerType::Random);
        let space = SearchSpace::new().float("x", 0.0, 1.0);

        let mut calls = 0;
        let mut optimizer = Optimizer::new(config, space);
        let study = optimizer
            .optimize(|params| {
                calls += 1;
                if calls % 2 == 0 {
                    Err(IrisError::TrainingError("diverged".to_string()))
                } else {
                    Ok(params["x"].as_float().unwrap_or(0.0))
                }
            })
            .unwrap();

        assert_eq!(study.trials.len(), 6);
        assert_eq!(study.n_pruned(), 3);
        assert!(!study.best_trial().unwrap().pruned);
    }

    #[test]
    fn test_flat_objective_runs_full_budget() {
        let config = OptimizationConfig::new().with_n_trials(25);
        let space = SearchSpace::new().float("x", 0.0, 1.0);

        let mut optimizer = Optimizer::new(config, space);
        let study = optimizer.optimize(|_| Ok(1.0)).unwrap();
        assert_eq!(study.trials.len(), 25);
        assert_eq!(study.best_trial_idx, Some(0));
    }

    #[test]
    fn test_study_roundtrip_with_pruned_trial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.json");

        let mut study = Study::new(OptimizeDirection::Maximize);
        study.add_trial(trial(None, true));
        study.add_trial(trial(Some(0.5), false));
        study.save(&path).unwrap();

        let loaded = Study::load(&path).unwrap();
        assert_eq!(loaded.trials.len(), 2);
        assert_eq!(loaded.best_value(), Some(0.5));
    }
}
