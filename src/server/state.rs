//! Loaded model and shared application state

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::dataset::{class_name, N_FEATURES};
use crate::error::{IrisError, Result};
use crate::training::ModelArtifact;

use super::ServerConfig;

/// A single prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Prediction {
    pub class_id: usize,
    pub name: &'static str,
}

/// A model artifact loaded once at startup and only read afterwards
#[derive(Debug, Clone)]
pub struct LoadedModel {
    version: String,
    path: PathBuf,
    artifact: ModelArtifact,
}

impl LoadedModel {
    /// Load the artifact at `path`; a missing or unreadable file is an error
    pub fn load(version: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let artifact = ModelArtifact::load(&path)?;
        let version = version.into();
        info!(
            version = %version,
            path = %path.display(),
            model = %artifact.hyperparameters,
            "Model loaded"
        );
        Ok(Self {
            version,
            path,
            artifact,
        })
    }

    pub fn from_artifact(version: impl Into<String>, artifact: ModelArtifact) -> Self {
        Self {
            version: version.into(),
            path: PathBuf::new(),
            artifact,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Predict from a slice that must hold exactly four measurements
    pub fn predict_slice(&self, features: &[f64]) -> Result<Prediction> {
        let features: [f64; N_FEATURES] =
            features.try_into().map_err(|_| IrisError::ShapeError {
                expected: format!("{} features", N_FEATURES),
                actual: format!("{} features", features.len()),
            })?;
        self.predict(&features)
    }

    pub fn predict(&self, features: &[f64; N_FEATURES]) -> Result<Prediction> {
        let class_id = self.artifact.predict_one(features)?;
        let name = class_name(class_id as i64)?;
        Ok(Prediction { class_id, name })
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub model: LoadedModel,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig, model: LoadedModel) -> Self {
        Self {
            config,
            model,
            started_at: chrono::Utc::now(),
        }
    }

    /// Load the configured model version
    pub fn load(config: ServerConfig) -> Result<Self> {
        let model = LoadedModel::load(config.model_version.clone(), config.model_path())?;
        Ok(Self::new(config, model))
    }
}
