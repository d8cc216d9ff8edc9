//! Integration test: tracking records survive a restart

use iris_mlops::dataset::prepare;
use iris_mlops::error::IrisError;
use iris_mlops::tracking::{ExperimentTracker, RunStatus};
use iris_mlops::training::{Hyperparameters, Trainer, TrainingConfig, DEFAULT_EXPERIMENT};

#[test]
fn test_training_run_persisted_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data/iris.csv");
    prepare(&data).unwrap();
    let mlruns = dir.path().join("mlruns");

    let report = {
        let tracker = ExperimentTracker::with_dir(&mlruns).unwrap();
        let config = TrainingConfig::new(Hyperparameters::logistic(1.0))
            .with_data_path(&data)
            .with_artifacts_dir(dir.path().join("artifacts"));
        Trainer::new(config).run(&tracker).unwrap()
    };

    let reopened = ExperimentTracker::with_dir(&mlruns).unwrap();
    let experiment = reopened.get_experiment_by_name(DEFAULT_EXPERIMENT).unwrap();
    let run = experiment.get_run(&report.run_id).unwrap();

    assert_eq!(run.run_name, "LogisticRegression_C=1.0");
    assert_eq!(run.status, RunStatus::Finished);
    assert_eq!(run.params["model_type"], "logistic");
    assert_eq!(run.params["solver"], "lbfgs");
    assert_eq!(run.params["max_iter"], "200");
    assert_eq!(run.metrics["accuracy"], report.accuracy);

    assert_eq!(run.artifacts.len(), 2);
    for stored in &run.artifacts {
        assert!(std::path::Path::new(stored).exists(), "{}", stored);
        assert!(stored.starts_with(mlruns.to_str().unwrap()));
    }
}

#[test]
fn test_failed_run_is_marked() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = ExperimentTracker::in_memory();
    let config = TrainingConfig::new(Hyperparameters::svm(1.0))
        .with_data_path(dir.path().join("missing.csv"))
        .with_artifacts_dir(dir.path().join("artifacts"));

    assert!(Trainer::new(config).run(&tracker).is_err());

    let experiment = tracker.get_experiment_by_name(DEFAULT_EXPERIMENT).unwrap();
    assert_eq!(experiment.runs.len(), 1);
    assert_eq!(experiment.runs[0].status, RunStatus::Failed);
    assert!(tracker.active_run().is_none());
}

#[test]
fn test_training_error_survives_tracking_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mlruns = dir.path().join("mlruns");
    let tracker = ExperimentTracker::with_dir(&mlruns).unwrap();
    // the store can no longer be written once the directory is a file
    std::fs::remove_dir_all(&mlruns).unwrap();
    std::fs::write(&mlruns, "not a directory").unwrap();

    let config = TrainingConfig::new(Hyperparameters::logistic(1.0))
        .with_data_path(dir.path().join("missing.csv"))
        .with_artifacts_dir(dir.path().join("artifacts"));
    let err = Trainer::new(config).run(&tracker).unwrap_err();

    assert!(matches!(err, IrisError::DataError(_)), "{:?}", err);
    assert!(tracker.active_run().is_none());
}
