//! Single training run: split, fit, evaluate, persist, track

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::config::{Hyperparameters, TrainingConfig};
use super::metrics::{accuracy, ConfusionMatrix};
use super::model::{fit_classifier, ModelArtifact};
use super::plot::render_confusion_matrix;
use super::split::train_test_split;
use crate::dataset::{Dataset, CLASS_NAMES};
use crate::error::Result;
use crate::tracking::ExperimentTracker;

/// Outcome of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub run_id: String,
    pub run_name: String,
    pub hyperparameters: Hyperparameters,
    pub accuracy: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub n_train: usize,
    pub n_test: usize,
    pub model_path: PathBuf,
    pub confusion_matrix_path: PathBuf,
    pub training_time_secs: f64,
}

/// Runs one configuration end to end
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train, evaluate on the held-out split and record the run.
    ///
    /// A failure after the run has started marks it failed before the error
    /// is returned.
    #[instrument(skip_all, fields(model = %self.config.hyperparameters))]
    pub fn run(&self, tracker: &ExperimentTracker) -> Result<TrainingReport> {
        self.config.validate()?;

        tracker.set_experiment(self.config.experiment_name.clone());
        let run_name = self.config.hyperparameters.run_name();
        let run_id = tracker.start_run(run_name.clone());

        match self.execute(tracker, run_id, run_name) {
            Ok(report) => {
                tracker.end_run_success()?;
                Ok(report)
            }
            Err(err) => {
                tracker.abandon_run();
                Err(err)
            }
        }
    }

    fn execute(
        &self,
        tracker: &ExperimentTracker,
        run_id: String,
        run_name: String,
    ) -> Result<TrainingReport> {
        let start = Instant::now();
        let hp = self.config.hyperparameters;

        let dataset = Dataset::load_csv(&self.config.data_path)?;
        let split = train_test_split(&dataset, self.config.test_size, self.config.random_state)?;
        info!(
            n_train = split.n_train(),
            n_test = split.n_test(),
            "Data split"
        );

        let model = fit_classifier(&hp, &split.x_train, &split.y_train, self.config.random_state)?;
        let predictions = model.predict(&split.x_test)?;
        let acc = accuracy(&split.y_test, &predictions)?;
        let cm = ConfusionMatrix::compute(&split.y_test, &predictions, &CLASS_NAMES)?;

        tracker.log_params(hp.tracking_params());
        tracker.log_metric("accuracy", acc, None);

        let model_path = self.config.model_path();
        ModelArtifact::new(hp, model, split.n_train()).save(&model_path)?;
        tracker.log_artifact(&model_path)?;

        let cm_path = self.config.confusion_matrix_path();
        let title = format!("{} (C={:?})", hp.family().display_name(), hp.c());
        render_confusion_matrix(&cm, &title, &cm_path)?;
        tracker.log_artifact(&cm_path)?;

        let training_time_secs = start.elapsed().as_secs_f64();
        info!(
            run = %run_name,
            accuracy = acc,
            model_path = %model_path.display(),
            elapsed_secs = training_time_secs,
            "Training complete"
        );

        Ok(TrainingReport {
            run_id,
            run_name,
            hyperparameters: hp,
            accuracy: acc,
            confusion_matrix: cm,
            n_train: split.n_train(),
            n_test: split.n_test(),
            model_path,
            confusion_matrix_path: cm_path,
            training_time_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::prepare;
    use crate::error::IrisError;
    use crate::tracking::RunStatus;

    #[test]
    fn test_run_records_everything() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data/iris.csv");
        prepare(&data).unwrap();

        let config = TrainingConfig::new(Hyperparameters::logistic(1.0))
            .with_data_path(&data)
            .with_artifacts_dir(dir.path().join("artifacts"));
        let tracker = ExperimentTracker::in_memory();
        let report = Trainer::new(config).run(&tracker).unwrap();

        assert!(report.model_path.exists());
        assert!(report.confusion_matrix_path.exists());
        assert_eq!(report.n_test, 30);
        assert_eq!(report.confusion_matrix.total(), 30);
        assert!((report.accuracy - report.confusion_matrix.accuracy()).abs() < 1e-12);

        let exp = tracker.current_experiment().unwrap();
        let run = exp.get_run(&report.run_id).unwrap();
        assert_eq!(run.run_name, "LogisticRegression_C=1.0");
        assert_eq!(run.status, RunStatus::Finished);
        assert_eq!(run.params["model_type"], "logistic");
        assert_eq!(run.params["solver"], "lbfgs");
        assert_eq!(run.metrics["accuracy"], report.accuracy);
        assert_eq!(run.artifacts.len(), 2);
    }

    #[test]
    fn test_missing_dataset_marks_run_failed() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig::new(Hyperparameters::svm(1.0))
            .with_data_path(dir.path().join("missing.csv"))
            .with_artifacts_dir(dir.path());
        let tracker = ExperimentTracker::in_memory();

        let result = Trainer::new(config).run(&tracker);
        assert!(matches!(result, Err(IrisError::DataError(_))));

        let exp = tracker.current_experiment().unwrap();
        assert_eq!(exp.runs[0].status, RunStatus::Failed);
    }

    #[test]
    fn test_invalid_c_fails_before_run() {
        let config = TrainingConfig::new(Hyperparameters::logistic(-1.0));
        let tracker = ExperimentTracker::in_memory();
        assert!(Trainer::new(config).run(&tracker).is_err());
        assert!(tracker.list_experiments().is_empty());
    }
}
