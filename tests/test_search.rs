//! Integration test: hyperparameter search

use iris_mlops::dataset::prepare;
use iris_mlops::error::IrisError;
use iris_mlops::optimizer::{SamplerType, Study};
use iris_mlops::search::{HyperparameterSearch, SearchConfig, BEST_MODEL_RUN, STUDY_EXPERIMENT};
use iris_mlops::tracking::{ExperimentTracker, RunStatus};
use iris_mlops::training::ModelArtifact;

fn search_in(dir: &std::path::Path, n_trials: usize) -> SearchConfig {
    let data = dir.join("data/iris.csv");
    prepare(&data).unwrap();
    SearchConfig::new()
        .with_n_trials(n_trials)
        .with_cv_folds(3)
        .with_data_path(data)
        .with_artifacts_dir(dir.join("artifacts"))
}

#[test]
fn test_search_persists_best_model_and_study() {
    let dir = tempfile::tempdir().unwrap();
    let config = search_in(dir.path(), 4);
    let tracker = ExperimentTracker::in_memory();

    let report = HyperparameterSearch::new(config.clone()).run(&tracker).unwrap();

    assert_eq!(report.n_trials, 4);
    assert!(report.model_path.ends_with("optuna_best_model_final.pkl"));
    assert!((0.0..=1.0).contains(&report.best_cv_accuracy));
    assert!((0.0..=1.0).contains(&report.test_accuracy));

    let artifact = ModelArtifact::load(&report.model_path).unwrap();
    assert_eq!(artifact.hyperparameters, report.best_hyperparameters);

    let study = Study::load(config.study_path()).unwrap();
    assert_eq!(study.trials.len(), 4);
    for trial in study.completed_trials() {
        assert!(report.best_cv_accuracy >= trial.value.unwrap());
    }
    // the earliest trial reaching the maximum is the one selected
    let first_max = study
        .completed_trials()
        .find(|t| t.value == Some(report.best_cv_accuracy))
        .unwrap();
    assert_eq!(first_max.trial_id, report.best_trial);
}

#[test]
fn test_search_tracking_layout() {
    let dir = tempfile::tempdir().unwrap();
    let config = search_in(dir.path(), 3).with_sampler(SamplerType::Random);
    let tracker = ExperimentTracker::in_memory();

    let report = HyperparameterSearch::new(config).run(&tracker).unwrap();

    let experiment = tracker.get_experiment_by_name(STUDY_EXPERIMENT).unwrap();
    let parent = experiment
        .runs
        .iter()
        .find(|r| r.parent_run_id.is_none() && r.run_name != BEST_MODEL_RUN)
        .unwrap();

    let children = experiment.child_runs(&parent.run_id);
    assert_eq!(children.len(), 3);
    for (i, child) in children.iter().enumerate() {
        assert_eq!(child.run_name, format!("trial_{}", i));
        assert!(child.metrics.contains_key("accuracy"));
        assert!(child.params.contains_key("model_type"));
        assert!(child.params.contains_key("C"));
    }

    let final_run = experiment.get_run(&report.final_run_id).unwrap();
    assert_eq!(final_run.run_name, BEST_MODEL_RUN);
    assert_eq!(final_run.status, RunStatus::Finished);
    assert_eq!(final_run.metrics["best_cv_accuracy"], report.best_cv_accuracy);
    assert_eq!(final_run.metrics["test_accuracy"], report.test_accuracy);
    assert_eq!(final_run.artifacts.len(), 1);
}

#[test]
fn test_search_is_reproducible() {
    let a_dir = tempfile::tempdir().unwrap();
    let b_dir = tempfile::tempdir().unwrap();

    let a = HyperparameterSearch::new(search_in(a_dir.path(), 3))
        .run(&ExperimentTracker::in_memory())
        .unwrap();
    let b = HyperparameterSearch::new(search_in(b_dir.path(), 3))
        .run(&ExperimentTracker::in_memory())
        .unwrap();

    assert_eq!(a.best_hyperparameters, b.best_hyperparameters);
    assert_eq!(a.best_cv_accuracy, b.best_cv_accuracy);
    assert_eq!(a.test_accuracy, b.test_accuracy);
}

#[test]
fn test_all_trials_pruned_closes_parent_run() {
    let dir = tempfile::tempdir().unwrap();
    // more folds than training rows: every trial fails
    let config = search_in(dir.path(), 3).with_cv_folds(500);
    let tracker = ExperimentTracker::in_memory();

    let err = HyperparameterSearch::new(config.clone()).run(&tracker).unwrap_err();
    assert!(matches!(err, IrisError::OptimizationError(_)), "{:?}", err);
    assert!(tracker.active_run().is_none());

    let experiment = tracker.get_experiment_by_name(STUDY_EXPERIMENT).unwrap();
    assert_eq!(experiment.runs.len(), 4);
    assert!(experiment.runs.iter().all(|r| r.status == RunStatus::Failed));
    assert!(!config.model_path().exists());
}
