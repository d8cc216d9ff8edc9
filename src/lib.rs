//! iris-mlops - Iris classifier training, tuning, tracking and serving
//!
//! # Modules
//!
//! ## Data and models
//! - [`dataset`] - Built-in Iris table, CSV preparation and loading
//! - [`training`] - Logistic regression and SVM, split, metrics, artifacts
//! - [`optimizer`] - Search spaces, samplers and the trial loop
//! - [`search`] - Cross-validated hyperparameter search over both families
//! - [`pipeline`] - Four-step load/split/train/evaluate pipeline
//!
//! ## Infrastructure
//! - [`tracking`] - Experiment tracking with pluggable storage
//!
//! ## Services
//! - [`server`] - Prediction service
//! - [`demo`] - Interactive browser demo
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data and models
pub mod dataset;
pub mod training;
pub mod optimizer;
pub mod search;
pub mod pipeline;

// Infrastructure
pub mod tracking;

// Services
pub mod server;
pub mod demo;
pub mod cli;

pub use error::{IrisError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{IrisError, Result};

    // Data
    pub use crate::dataset::{class_name, prepare, Dataset, CLASS_NAMES, FEATURE_NAMES};

    // Training
    pub use crate::training::{
        accuracy, train_test_split, Classifier, ConfusionMatrix, Hyperparameters, LogisticSolver,
        ModelArtifact, ModelFamily, SvmKernel, Trainer, TrainingConfig,
    };

    // Optimization
    pub use crate::optimizer::{OptimizationConfig, Optimizer, SearchSpace, Study};
    pub use crate::search::{HyperparameterSearch, SearchConfig};

    // Pipeline
    pub use crate::pipeline::{IrisPipeline, PipelineParams};

    // Experiment tracking
    pub use crate::tracking::{Experiment, ExperimentConfig, ExperimentTracker, Run};

    // Serving
    pub use crate::demo::DemoConfig;
    pub use crate::server::{LoadedModel, ServerConfig};
}
