//! Trained classifiers and their on-disk artifact

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::config::{Hyperparameters, ModelFamily};
use super::logistic::LogisticRegression;
use super::svm::{SVMClassifier, SVMConfig};
use crate::dataset::{CLASS_NAMES, FEATURE_NAMES, N_FEATURES};
use crate::error::{IrisError, Result};

/// Bumped when the artifact layout changes incompatibly
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// A classifier of either family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", content = "model", rename_all = "lowercase")]
pub enum Classifier {
    Logistic(LogisticRegression),
    Svm(SVMClassifier),
}

impl Classifier {
    /// Unfitted classifier for the given hyperparameters
    pub fn from_hyperparameters(hyperparameters: &Hyperparameters, seed: u64) -> Result<Self> {
        hyperparameters.validate()?;
        Ok(match *hyperparameters {
            Hyperparameters::Logistic {
                c,
                solver,
                max_iter,
            } => Classifier::Logistic(
                LogisticRegression::new(c)
                    .with_solver(solver)
                    .with_max_iter(max_iter),
            ),
            Hyperparameters::Svm { c, kernel } => Classifier::Svm(SVMClassifier::new(
                SVMConfig::new(c, kernel).with_random_state(seed),
            )),
        })
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            Classifier::Logistic(_) => ModelFamily::Logistic,
            Classifier::Svm(_) => ModelFamily::Svm,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        match self {
            Classifier::Logistic(model) => model.fit(x, y).map(|_| ()),
            Classifier::Svm(model) => model.fit(x, y),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        match self {
            Classifier::Logistic(model) => model.predict(x),
            Classifier::Svm(model) => model.predict(x),
        }
    }
}

/// Fit a fresh classifier on the given data
pub fn fit_classifier(
    hyperparameters: &Hyperparameters,
    x: &Array2<f64>,
    y: &Array1<usize>,
    seed: u64,
) -> Result<Classifier> {
    let mut model = Classifier::from_hyperparameters(hyperparameters, seed)?;
    model.fit(x, y)?;
    Ok(model)
}

/// A fitted classifier plus what is needed to use it later.
///
/// Stored as JSON. The conventional `.pkl` file names are kept so the
/// service can pick artifacts up by version tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub hyperparameters: Hyperparameters,
    pub classifier: Classifier,
    pub feature_names: Vec<String>,
    pub class_names: Vec<String>,
    pub n_train_samples: usize,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn new(hyperparameters: Hyperparameters, classifier: Classifier, n_train_samples: usize) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            hyperparameters,
            classifier,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            class_names: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            n_train_samples,
            trained_at: Utc::now(),
        }
    }

    /// Write the artifact, creating the parent directory if needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!(path = %path.display(), model = %self.hyperparameters, "Model saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IrisError::ArtifactNotFound(path.to_path_buf()));
        }
        let json = fs::read_to_string(path)?;
        let artifact: Self = serde_json::from_str(&json)?;
        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(IrisError::SerializationError(format!(
                "unsupported artifact format {} in {}",
                artifact.format_version,
                path.display()
            )));
        }
        Ok(artifact)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        self.classifier.predict(x)
    }

    /// Class id for a single measurement
    pub fn predict_one(&self, features: &[f64; N_FEATURES]) -> Result<usize> {
        let x = Array2::from_shape_vec((1, N_FEATURES), features.to_vec())?;
        let prediction = self.predict(&x)?;
        prediction
            .first()
            .copied()
            .ok_or_else(|| IrisError::TrainingError("classifier returned no prediction".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::training::config::SvmKernel;

    #[test]
    fn test_save_load_predicts_identically() {
        let ds = Dataset::iris();
        let dir = tempfile::tempdir().unwrap();

        for hp in [
            Hyperparameters::logistic(1.0),
            Hyperparameters::svm(1.0).with_kernel(SvmKernel::Linear),
        ] {
            let model = fit_classifier(&hp, &ds.features, &ds.targets, 42).unwrap();
            let artifact = ModelArtifact::new(hp, model, ds.len());
            let path = dir.path().join(format!("model_{}.pkl", hp.family()));
            artifact.save(&path).unwrap();

            let loaded = ModelArtifact::load(&path).unwrap();
            assert_eq!(loaded.hyperparameters, hp);
            assert_eq!(loaded.classifier.family(), hp.family());
            assert_eq!(
                loaded.predict(&ds.features).unwrap(),
                artifact.predict(&ds.features).unwrap()
            );
        }
    }

    #[test]
    fn test_load_missing() {
        let result = ModelArtifact::load("/nonexistent/model_v9.pkl");
        assert!(matches!(result, Err(IrisError::ArtifactNotFound(_))));
    }

    #[test]
    fn test_load_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pkl");
        std::fs::write(&path, "definitely not a model").unwrap();
        assert!(matches!(
            ModelArtifact::load(&path),
            Err(IrisError::SerializationError(_))
        ));
    }

    #[test]
    fn test_predict_one() {
        let ds = Dataset::iris();
        let hp = Hyperparameters::logistic(1.0).with_max_iter(1000);
        let model = fit_classifier(&hp, &ds.features, &ds.targets, 42).unwrap();
        let artifact = ModelArtifact::new(hp, model, ds.len());

        assert_eq!(artifact.predict_one(&[5.1, 3.5, 1.4, 0.2]).unwrap(), 0);
        assert_eq!(artifact.predict_one(&[6.7, 3.0, 5.2, 2.3]).unwrap(), 2);
    }

    #[test]
    fn test_invalid_hyperparameters_rejected() {
        assert!(Classifier::from_hyperparameters(&Hyperparameters::svm(0.0), 42).is_err());
    }
}
