//! Four-step training pipeline
//!
//! `load_data -> split_data -> train_model -> evaluate_model`. Each step is a
//! plain function with typed inputs and outputs. The trained model is handed
//! from training to evaluation as a file path, never in memory.

use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::dataset::{Dataset, DEFAULT_DATA_PATH};
use crate::error::Result;
use crate::training::{
    accuracy, fit_classifier, train_test_split, Hyperparameters, ModelArtifact, ModelFamily,
    SplitData, DEFAULT_ARTIFACTS_DIR, DEFAULT_RANDOM_STATE, DEFAULT_TEST_SIZE,
};

/// File the pipeline writes its model to
pub const PIPELINE_MODEL_FILE: &str = "zenml_model.pkl";

/// Read the prepared dataset
pub fn load_data(path: impl AsRef<Path>) -> Result<Dataset> {
    Dataset::load_csv(path)
}

/// Stratified 80/20 split with the fixed seed
pub fn split_data(dataset: &Dataset) -> Result<SplitData> {
    train_test_split(dataset, DEFAULT_TEST_SIZE, DEFAULT_RANDOM_STATE)
}

/// Fit a model of `family` with strength `c` and write it to `path`.
///
/// Logistic models use lbfgs with `max_iter = 200`, SVMs the rbf kernel.
pub fn train_model(
    x_train: &Array2<f64>,
    y_train: &Array1<usize>,
    family: ModelFamily,
    c: f64,
    path: impl AsRef<Path>,
) -> Result<PathBuf> {
    let hp = match family {
        ModelFamily::Logistic => Hyperparameters::logistic(c),
        ModelFamily::Svm => Hyperparameters::svm(c),
    };
    hp.validate()?;

    let model = fit_classifier(&hp, x_train, y_train, DEFAULT_RANDOM_STATE)?;
    let path = path.as_ref().to_path_buf();
    ModelArtifact::new(hp, model, y_train.len()).save(&path)?;
    Ok(path)
}

/// Load the model at `path` and score it on the given data
pub fn evaluate_model(
    path: impl AsRef<Path>,
    x_test: &Array2<f64>,
    y_test: &Array1<usize>,
) -> Result<f64> {
    let artifact = ModelArtifact::load(path)?;
    let predictions = artifact.predict(x_test)?;
    accuracy(y_test, &predictions)
}

/// Pipeline parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineParams {
    pub model_type: ModelFamily,
    #[serde(rename = "C")]
    pub c: f64,
    pub data_path: PathBuf,
    pub model_path: PathBuf,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self::baseline_logistic()
    }
}

impl PipelineParams {
    pub fn new(model_type: ModelFamily, c: f64) -> Self {
        Self {
            model_type,
            c,
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            model_path: Path::new(DEFAULT_ARTIFACTS_DIR).join(PIPELINE_MODEL_FILE),
        }
    }

    /// Logistic regression, `C = 1.0`
    pub fn baseline_logistic() -> Self {
        Self::new(ModelFamily::Logistic, 1.0)
    }

    /// RBF SVM, `C = 1.0`
    pub fn svm() -> Self {
        Self::new(ModelFamily::Svm, 1.0)
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }
}

/// Timing of one executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub duration_secs: f64,
}

/// Result of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub params: PipelineParams,
    pub accuracy: f64,
    pub model_path: PathBuf,
    pub steps: Vec<StepRecord>,
    pub total_secs: f64,
}

/// Composes the four steps. The first failing step aborts the run.
#[derive(Debug, Default)]
pub struct IrisPipeline;

impl IrisPipeline {
    pub fn new() -> Self {
        Self
    }

    /// Step names in execution order
    pub fn steps(&self) -> [&'static str; 4] {
        ["load_data", "split_data", "train_model", "evaluate_model"]
    }

    #[instrument(skip_all, fields(model = %params.model_type, c = params.c))]
    pub fn run(&self, params: &PipelineParams) -> Result<PipelineRun> {
        let start = Instant::now();
        let mut steps = Vec::with_capacity(4);

        let dataset = timed(&mut steps, "load_data", || load_data(&params.data_path))?;
        let split = timed(&mut steps, "split_data", || split_data(&dataset))?;
        let model_path = timed(&mut steps, "train_model", || {
            train_model(
                &split.x_train,
                &split.y_train,
                params.model_type,
                params.c,
                &params.model_path,
            )
        })?;
        let acc = timed(&mut steps, "evaluate_model", || {
            evaluate_model(&model_path, &split.x_test, &split.y_test)
        })?;

        let total_secs = start.elapsed().as_secs_f64();
        info!(accuracy = acc, total_secs, "Pipeline finished");

        Ok(PipelineRun {
            params: params.clone(),
            accuracy: acc,
            model_path,
            steps,
            total_secs,
        })
    }
}

fn timed<T>(
    steps: &mut Vec<StepRecord>,
    name: &str,
    step: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let start = Instant::now();
    debug!(step = name, "Step started");
    let out = step()?;
    let duration_secs = start.elapsed().as_secs_f64();
    info!(step = name, duration_secs, "Step finished");
    steps.push(StepRecord {
        name: name.to_string(),
        duration_secs,
    });
    Ok(out)
}
