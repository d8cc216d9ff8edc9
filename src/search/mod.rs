//! Cross-validated hyperparameter search
//!
//! Each trial proposes a model family, a log-uniform `C` and the family's
//! solver or kernel, and is scored by stratified k-fold accuracy on the
//! training partition. The best trial is refit on the whole training
//! partition, scored once on the test partition and persisted.

use std::path::PathBuf;
use std::time::Instant;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::dataset::{Dataset, DEFAULT_DATA_PATH};
use crate::error::{IrisError, Result};
use crate::optimizer::{
    OptimizationConfig, OptimizeDirection, Optimizer, ParameterValue, SamplerType, SearchSpace,
    Study, TrialParams,
};
use crate::tracking::ExperimentTracker;
use crate::training::{
    accuracy, cross_val_score, fit_classifier, train_test_split, CrossValidator, Hyperparameters,
    LogisticSolver, ModelArtifact, ModelFamily, SplitData, SvmKernel, DEFAULT_ARTIFACTS_DIR,
    DEFAULT_RANDOM_STATE, DEFAULT_TEST_SIZE,
};

/// Experiment holding the search runs
pub const STUDY_EXPERIMENT: &str = "optuna_iris_study";

/// Name of the refit run and stem of the persisted best model
pub const BEST_MODEL_RUN: &str = "optuna_best_model_final";

/// File name of the study summary
pub const STUDY_FILE: &str = "optuna_study.json";

/// Lower bound of the `C` range
pub const C_LOW: f64 = 1e-3;

/// Upper bound of the `C` range
pub const C_HIGH: f64 = 1e3;

/// Iteration cap for logistic trials
pub const SEARCH_MAX_ITER: usize = 500;

const SEARCH_SOLVERS: [&str; 3] = ["lbfgs", "newton-cg", "liblinear"];
const SEARCH_KERNELS: [&str; 3] = ["linear", "rbf", "poly"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub n_trials: usize,
    pub cv_folds: usize,
    pub random_state: u64,
    pub test_size: f64,
    pub data_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub sampler: SamplerType,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_trials: 10,
            cv_folds: 5,
            random_state: DEFAULT_RANDOM_STATE,
            test_size: DEFAULT_TEST_SIZE,
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            sampler: SamplerType::TPE,
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerType) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn model_path(&self) -> PathBuf {
        self.artifacts_dir.join(format!("{}.pkl", BEST_MODEL_RUN))
    }

    pub fn study_path(&self) -> PathBuf {
        self.artifacts_dir.join(STUDY_FILE)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_trials == 0 {
            return Err(IrisError::invalid_parameter("n_trials", self.n_trials, "must be at least 1"));
        }
        if self.cv_folds < 2 {
            return Err(IrisError::invalid_parameter("cv_folds", self.cv_folds, "must be at least 2"));
        }
        Ok(())
    }
}

/// Outcome of a search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    pub best_trial: usize,
    pub best_hyperparameters: Hyperparameters,
    pub best_cv_accuracy: f64,
    pub test_accuracy: f64,
    pub n_trials: usize,
    pub n_pruned: usize,
    pub model_path: PathBuf,
    pub study_path: PathBuf,
    pub final_run_id: String,
    pub elapsed_secs: f64,
}

/// The search space over both model families
pub fn search_space() -> SearchSpace {
    SearchSpace::new()
        .categorical("model_type", &[ModelFamily::Logistic.as_str(), ModelFamily::Svm.as_str()])
        .log_float("C", C_LOW, C_HIGH)
        .categorical("solver", &SEARCH_SOLVERS)
        .categorical("kernel", &SEARCH_KERNELS)
}

fn string_param<'a>(params: &'a TrialParams, name: &str) -> Result<&'a str> {
    params
        .get(name)
        .and_then(ParameterValue::as_string)
        .ok_or_else(|| IrisError::OptimizationError(format!("trial has no '{}' choice", name)))
}

/// Turn a sampled assignment into concrete hyperparameters
pub fn hyperparameters_from_trial(params: &TrialParams) -> Result<Hyperparameters> {
    let family: ModelFamily = string_param(params, "model_type")?.parse()?;
    let c = params
        .get("C")
        .and_then(ParameterValue::as_float)
        .ok_or_else(|| IrisError::OptimizationError("trial has no 'C' value".to_string()))?;

    let hp = match family {
        ModelFamily::Logistic => {
            let solver: LogisticSolver = string_param(params, "solver")?.parse()?;
            Hyperparameters::logistic(c)
                .with_solver(solver)
                .with_max_iter(SEARCH_MAX_ITER)
        }
        ModelFamily::Svm => {
            let kernel: SvmKernel = string_param(params, "kernel")?.parse()?;
            Hyperparameters::svm(c).with_kernel(kernel)
        }
    };
    Ok(hp)
}

/// Keep only the keys the sampled family actually uses
pub fn relevant_params(params: &TrialParams) -> TrialParams {
    let unused = match params.get("model_type").and_then(ParameterValue::as_string) {
        Some("logistic") => Some("kernel"),
        Some("svm") => Some("solver"),
        _ => None,
    };
    params
        .iter()
        .filter(|(k, _)| Some(k.as_str()) != unused)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Runs the trial budget and persists the refit winner
pub struct HyperparameterSearch {
    config: SearchConfig,
}

impl HyperparameterSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    #[instrument(skip_all, fields(n_trials = self.config.n_trials))]
    pub fn run(&self, tracker: &ExperimentTracker) -> Result<SearchReport> {
        self.config.validate()?;
        let start = Instant::now();

        let dataset = Dataset::load_csv(&self.config.data_path)?;
        let split = train_test_split(&dataset, self.config.test_size, self.config.random_state)?;

        tracker.set_experiment(STUDY_EXPERIMENT);
        tracker.start_run("optuna_search");
        tracker.log_param("n_trials", self.config.n_trials);
        tracker.log_param("cv_folds", self.config.cv_folds);

        let (study, best_trial, best_cv_accuracy, best_hp) = match self.search(tracker, &split) {
            Ok(found) => found,
            Err(err) => {
                tracker.abandon_run();
                return Err(err);
            }
        };
        tracker.end_run_success()?;
        info!(
            best_trial,
            best_cv_accuracy,
            best = %best_hp,
            pruned = study.n_pruned(),
            "Search finished"
        );

        let study_path = self.config.study_path();
        study.save(&study_path)?;

        let (final_run_id, test_accuracy) = self.refit_best(tracker, &split, best_hp, best_cv_accuracy)?;

        Ok(SearchReport {
            best_trial,
            best_hyperparameters: best_hp,
            best_cv_accuracy,
            test_accuracy,
            n_trials: study.trials.len(),
            n_pruned: study.n_pruned(),
            model_path: self.config.model_path(),
            study_path,
            final_run_id,
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }

    /// Trials plus winner selection, all inside the parent run
    fn search(
        &self,
        tracker: &ExperimentTracker,
        split: &SplitData,
    ) -> Result<(Study, usize, f64, Hyperparameters)> {
        let study = self.run_trials(tracker, split)?;
        let best = study
            .best_trial()
            .ok_or_else(|| IrisError::OptimizationError("every trial was pruned".to_string()))?;
        let best_trial = best.trial_id;
        let best_cv_accuracy = best.value.unwrap_or_default();
        let best_hp = hyperparameters_from_trial(&best.params)?;

        tracker.log_params(best_hp.tracking_params());
        tracker.log_metric("best_cv_accuracy", best_cv_accuracy, None);
        Ok((study, best_trial, best_cv_accuracy, best_hp))
    }

    fn run_trials(&self, tracker: &ExperimentTracker, split: &SplitData) -> Result<Study> {
        let opt_config = OptimizationConfig::new()
            .with_n_trials(self.config.n_trials)
            .with_direction(OptimizeDirection::Maximize)
            .with_sampler(self.config.sampler)
            .with_random_state(self.config.random_state);
        let cv = CrossValidator::stratified(self.config.cv_folds);
        let seed = self.config.random_state;

        let mut optimizer = Optimizer::new(opt_config, search_space());
        let mut trial_number = 0usize;

        optimizer.optimize(|params| {
            let name = format!("trial_{}", trial_number);
            trial_number += 1;
            tracker.start_child_run(name.clone());

            match score_trial(tracker, params, &split.x_train, &split.y_train, &cv, seed) {
                Ok(score) => {
                    tracker.end_run_success()?;
                    debug!(trial = %name, score, "Trial scored");
                    Ok(score)
                }
                Err(err) => {
                    tracker.abandon_run();
                    Err(err)
                }
            }
        })?;

        let mut study = optimizer.into_study();
        for trial in &mut study.trials {
            trial.params = relevant_params(&trial.params);
        }
        Ok(study)
    }

    fn refit_best(
        &self,
        tracker: &ExperimentTracker,
        split: &SplitData,
        hp: Hyperparameters,
        best_cv_accuracy: f64,
    ) -> Result<(String, f64)> {
        let run_id = tracker.start_run(BEST_MODEL_RUN);

        match self.fit_and_persist(tracker, split, hp, best_cv_accuracy) {
            Ok(test_accuracy) => {
                tracker.end_run_success()?;
                Ok((run_id, test_accuracy))
            }
            Err(err) => {
                tracker.abandon_run();
                Err(err)
            }
        }
    }

    fn fit_and_persist(
        &self,
        tracker: &ExperimentTracker,
        split: &SplitData,
        hp: Hyperparameters,
        best_cv_accuracy: f64,
    ) -> Result<f64> {
        let model = fit_classifier(&hp, &split.x_train, &split.y_train, self.config.random_state)?;
        let test_accuracy = accuracy(&split.y_test, &model.predict(&split.x_test)?)?;

        tracker.log_params(hp.tracking_params());
        tracker.log_metric("best_cv_accuracy", best_cv_accuracy, None);
        tracker.log_metric("test_accuracy", test_accuracy, None);

        let model_path = self.config.model_path();
        ModelArtifact::new(hp, model, split.n_train()).save(&model_path)?;
        tracker.log_artifact(&model_path)?;

        info!(
            test_accuracy,
            model_path = %model_path.display(),
            "Best model refit and saved"
        );
        Ok(test_accuracy)
    }
}

fn score_trial(
    tracker: &ExperimentTracker,
    params: &TrialParams,
    x: &Array2<f64>,
    y: &Array1<usize>,
    cv: &CrossValidator,
    seed: u64,
) -> Result<f64> {
    let hp = hyperparameters_from_trial(params)?;
    tracker.log_params(hp.tracking_params());

    let results = cross_val_score(&hp, x, y, cv, seed)?;
    tracker.log_metric("accuracy", results.mean_score, None);
    Ok(results.mean_score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(pairs: &[(&str, ParameterValue)]) -> TrialParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_logistic_trial_mapping() {
        let params = trial(&[
            ("model_type", ParameterValue::String("logistic".into())),
            ("C", ParameterValue::Float(0.5)),
            ("solver", ParameterValue::String("newton-cg".into())),
            ("kernel", ParameterValue::String("rbf".into())),
        ]);

        let hp = hyperparameters_from_trial(&params).unwrap();
        assert_eq!(
            hp,
            Hyperparameters::logistic(0.5)
                .with_solver(LogisticSolver::NewtonCg)
                .with_max_iter(SEARCH_MAX_ITER)
        );

        let kept = relevant_params(&params);
        assert!(kept.contains_key("solver"));
        assert!(!kept.contains_key("kernel"));
    }

    #[test]
    fn test_svm_trial_mapping() {
        let params = trial(&[
            ("model_type", ParameterValue::String("svm".into())),
            ("C", ParameterValue::Float(10.0)),
            ("solver", ParameterValue::String("lbfgs".into())),
            ("kernel", ParameterValue::String("poly".into())),
        ]);

        let hp = hyperparameters_from_trial(&params).unwrap();
        assert_eq!(hp, Hyperparameters::svm(10.0).with_kernel(SvmKernel::Poly));
        assert!(!relevant_params(&params).contains_key("solver"));
    }

    #[test]
    fn test_missing_choice_is_error() {
        let params = trial(&[("model_type", ParameterValue::String("svm".into()))]);
        assert!(matches!(
            hyperparameters_from_trial(&params),
            Err(IrisError::OptimizationError(_))
        ));
    }

    #[test]
    fn test_space_covers_both_families() {
        let space = search_space();
        assert_eq!(space.len(), 4);
        match &space.get("C").unwrap().param_type {
            crate::optimizer::ParameterType::Float {
                low,
                high,
                log_scale,
            } => {
                assert_eq!((*low, *high, *log_scale), (C_LOW, C_HIGH, true));
            }
            other => panic!("unexpected C parameter {:?}", other),
        }
    }

    #[test]
    fn test_config_paths_and_validation() {
        let config = SearchConfig::new().with_artifacts_dir("out");
        assert_eq!(config.model_path(), PathBuf::from("out/optuna_best_model_final.pkl"));
        assert_eq!(config.study_path(), PathBuf::from("out/optuna_study.json"));
        assert!(config.validate().is_ok());
        assert!(SearchConfig::new().with_cv_folds(1).validate().is_err());
        assert!(SearchConfig::new().with_n_trials(0).validate().is_err());
    }
}
