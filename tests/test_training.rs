//! Integration test: dataset preparation and training runs

use iris_mlops::dataset::{prepare, Dataset, CLASS_NAMES};
use iris_mlops::error::IrisError;
use iris_mlops::tracking::{ExperimentTracker, RunStatus};
use iris_mlops::training::{
    accuracy, train_test_split, Hyperparameters, LogisticSolver, ModelArtifact, SvmKernel,
    Trainer, TrainingConfig,
};

fn prepared_dir() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data/iris.csv");
    prepare(&data).unwrap();
    (dir, data)
}

#[test]
fn test_prepare_then_load_matches_builtin() {
    let (_dir, data) = prepared_dir();
    let loaded = Dataset::load_csv(&data).unwrap();
    let builtin = Dataset::iris();

    assert_eq!(loaded.len(), 150);
    assert_eq!(loaded.targets, builtin.targets);
    assert_eq!(loaded.class_counts(), [50, 50, 50]);
}

#[test]
fn test_split_is_deterministic() {
    let ds = Dataset::iris();
    let a = train_test_split(&ds, 0.2, 42).unwrap();
    let b = train_test_split(&ds, 0.2, 42).unwrap();
    assert_eq!(a.indices.train, b.indices.train);
    assert_eq!(a.indices.test, b.indices.test);
    assert_eq!(a.n_test(), 30);
}

#[test]
fn test_every_configuration_trains() {
    let (dir, data) = prepared_dir();
    let tracker = ExperimentTracker::in_memory();

    let configs = [
        Hyperparameters::logistic(1.0),
        Hyperparameters::logistic(0.5).with_solver(LogisticSolver::NewtonCg),
        Hyperparameters::logistic(1.0).with_solver(LogisticSolver::Liblinear),
        Hyperparameters::svm(1.0),
        Hyperparameters::svm(1.0).with_kernel(SvmKernel::Linear),
        Hyperparameters::svm(1.0).with_kernel(SvmKernel::Poly),
    ];

    for hp in configs {
        let config = TrainingConfig::new(hp)
            .with_data_path(&data)
            .with_artifacts_dir(dir.path().join("artifacts"));
        let report = Trainer::new(config).run(&tracker).unwrap();
        assert!(
            report.accuracy > 0.8,
            "{} scored {}",
            hp,
            report.accuracy
        );
        assert!(report.model_path.exists());
        assert!(report.confusion_matrix_path.exists());
    }
}

#[test]
fn test_logged_accuracy_matches_recomputed() {
    let (dir, data) = prepared_dir();
    let tracker = ExperimentTracker::in_memory();
    let config = TrainingConfig::new(Hyperparameters::svm(1.0))
        .with_data_path(&data)
        .with_artifacts_dir(dir.path().join("artifacts"));
    let report = Trainer::new(config).run(&tracker).unwrap();

    let split = train_test_split(&Dataset::load_csv(&data).unwrap(), 0.2, 42).unwrap();
    let artifact = ModelArtifact::load(&report.model_path).unwrap();
    let recomputed = accuracy(&split.y_test, &artifact.predict(&split.x_test).unwrap()).unwrap();
    assert_eq!(report.accuracy, recomputed);

    let experiment = tracker.current_experiment().unwrap();
    let run = experiment.get_run(&report.run_id).unwrap();
    assert_eq!(run.run_name, "SVM_C=1.0");
    assert_eq!(run.status, RunStatus::Finished);
    assert_eq!(run.metrics["accuracy"], report.accuracy);
    assert_eq!(run.params["kernel"], "rbf");
    assert_eq!(artifact.class_names, CLASS_NAMES.map(String::from).to_vec());
}

#[test]
fn test_same_inputs_same_accuracy() {
    let (dir, data) = prepared_dir();
    let tracker = ExperimentTracker::in_memory();
    let run = || {
        let config = TrainingConfig::new(Hyperparameters::logistic(1.0))
            .with_data_path(&data)
            .with_artifacts_dir(dir.path().join("artifacts"));
        Trainer::new(config).run(&tracker).unwrap().accuracy
    };
    assert_eq!(run(), run());
}

#[test]
fn test_versioned_model_file() {
    let (dir, data) = prepared_dir();
    let config = TrainingConfig::new(Hyperparameters::logistic(1.0))
        .with_data_path(&data)
        .with_artifacts_dir(dir.path().join("artifacts"))
        .with_version("v2");
    let report = Trainer::new(config)
        .run(&ExperimentTracker::in_memory())
        .unwrap();
    assert_eq!(report.model_path, dir.path().join("artifacts/model_v2.pkl"));
}

#[test]
fn test_invalid_c_and_missing_data() {
    let (dir, data) = prepared_dir();
    let tracker = ExperimentTracker::in_memory();

    let bad_c = TrainingConfig::new(Hyperparameters::svm(0.0)).with_data_path(&data);
    assert!(matches!(
        Trainer::new(bad_c).run(&tracker),
        Err(IrisError::InvalidParameter { .. })
    ));

    let missing = TrainingConfig::new(Hyperparameters::logistic(1.0))
        .with_data_path(dir.path().join("absent.csv"))
        .with_artifacts_dir(dir.path().join("artifacts"));
    assert!(Trainer::new(missing).run(&tracker).is_err());
}
