//! Error types for the iris-mlops crate

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, IrisError>;

/// Main error type
#[derive(Error, Debug)]
pub enum IrisError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Model artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Unknown class id: {0}")]
    UnknownClass(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Optimization error: {0}")]
    OptimizationError(String),

    #[error("Tracking error: {0}")]
    TrackingError(String),

    #[error("Plot error: {0}")]
    PlotError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl IrisError {
    /// Shorthand for an [`IrisError::InvalidParameter`]
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        IrisError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for IrisError {
    fn from(err: polars::error::PolarsError) -> Self {
        IrisError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for IrisError {
    fn from(err: serde_json::Error) -> Self {
        IrisError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for IrisError {
    fn from(err: ndarray::ShapeError) -> Self {
        IrisError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<image::ImageError> for IrisError {
    fn from(err: image::ImageError) -> Self {
        IrisError::PlotError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IrisError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: IrisError = io_err.into();
        assert!(matches!(err, IrisError::IoError(_)));
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = IrisError::invalid_parameter("C", -1.0, "must be positive");
        assert_eq!(err.to_string(), "Invalid parameter: C = -1, must be positive");
    }

    #[test]
    fn test_artifact_not_found_display() {
        let err = IrisError::ArtifactNotFound(PathBuf::from("artifacts/model_v9.pkl"));
        assert!(err.to_string().contains("artifacts/model_v9.pkl"));
    }
}
