//! Model training
//!
//! Two classifier families are supported:
//! - Logistic regression (multinomial L-BFGS / Newton-CG, or one-vs-rest)
//! - Support vector classifier (SMO, one-vs-rest)
//!
//! plus the stratified split, cross-validation, metrics, the confusion
//! matrix plot and the persisted model artifact.

mod config;
mod optim;
pub mod cross_validation;
pub mod logistic;
pub mod metrics;
pub mod model;
pub mod plot;
pub mod split;
pub mod svm;
pub mod trainer;

pub use config::{
    Hyperparameters, LogisticSolver, ModelFamily, SvmKernel, TrainingConfig,
    DEFAULT_ARTIFACTS_DIR, DEFAULT_EXPERIMENT, DEFAULT_RANDOM_STATE, DEFAULT_TEST_SIZE,
};
pub use cross_validation::{cross_val_score, CVResults, CVSplit, CVStrategy, CrossValidator};
pub use logistic::LogisticRegression;
pub use metrics::{accuracy, ConfusionMatrix};
pub use model::{fit_classifier, Classifier, ModelArtifact};
pub use plot::render_confusion_matrix;
pub use split::{stratified_split_indices, train_test_split, SplitData, SplitIndices};
pub use svm::{Gamma, KernelType, SVMClassifier, SVMConfig};
pub use trainer::{Trainer, TrainingReport};
