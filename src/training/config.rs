//! Training configuration

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::DEFAULT_DATA_PATH;
use crate::error::{IrisError, Result};

/// Default artifact directory
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Fraction of rows held out for evaluation
pub const DEFAULT_TEST_SIZE: f64 = 0.2;

/// Seed for every split and stochastic solver
pub const DEFAULT_RANDOM_STATE: u64 = 42;

/// Experiment name used by the trainer
pub const DEFAULT_EXPERIMENT: &str = "iris_classification";

/// Classifier family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Logistic,
    Svm,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Logistic => "logistic",
            ModelFamily::Svm => "svm",
        }
    }

    /// Human-readable model name used in run names and plot titles
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelFamily::Logistic => "LogisticRegression",
            ModelFamily::Svm => "SVM",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = IrisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "logistic" => Ok(ModelFamily::Logistic),
            "svm" => Ok(ModelFamily::Svm),
            other => Err(IrisError::invalid_parameter(
                "model",
                other,
                "expected 'logistic' or 'svm'",
            )),
        }
    }
}

/// Solver for logistic regression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogisticSolver {
    /// Multinomial loss, limited-memory BFGS
    #[serde(rename = "lbfgs")]
    Lbfgs,
    /// Multinomial loss, truncated Newton with conjugate gradient
    #[serde(rename = "newton-cg")]
    NewtonCg,
    /// One-vs-rest binary problems with a penalized intercept
    #[serde(rename = "liblinear")]
    Liblinear,
}

impl LogisticSolver {
    pub const ALL: [LogisticSolver; 3] = [
        LogisticSolver::Lbfgs,
        LogisticSolver::Liblinear,
        LogisticSolver::NewtonCg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogisticSolver::Lbfgs => "lbfgs",
            LogisticSolver::NewtonCg => "newton-cg",
            LogisticSolver::Liblinear => "liblinear",
        }
    }
}

impl fmt::Display for LogisticSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogisticSolver {
    type Err = IrisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lbfgs" => Ok(LogisticSolver::Lbfgs),
            "newton-cg" => Ok(LogisticSolver::NewtonCg),
            "liblinear" => Ok(LogisticSolver::Liblinear),
            other => Err(IrisError::invalid_parameter(
                "solver",
                other,
                "expected one of lbfgs, liblinear, newton-cg",
            )),
        }
    }
}

/// Kernel for the support vector classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SvmKernel {
    Linear,
    Rbf,
    Poly,
    Sigmoid,
}

impl SvmKernel {
    pub const ALL: [SvmKernel; 4] = [
        SvmKernel::Linear,
        SvmKernel::Rbf,
        SvmKernel::Poly,
        SvmKernel::Sigmoid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SvmKernel::Linear => "linear",
            SvmKernel::Rbf => "rbf",
            SvmKernel::Poly => "poly",
            SvmKernel::Sigmoid => "sigmoid",
        }
    }
}

impl fmt::Display for SvmKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SvmKernel {
    type Err = IrisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(SvmKernel::Linear),
            "rbf" => Ok(SvmKernel::Rbf),
            "poly" => Ok(SvmKernel::Poly),
            "sigmoid" => Ok(SvmKernel::Sigmoid),
            other => Err(IrisError::invalid_parameter(
                "kernel",
                other,
                "expected one of linear, rbf, poly, sigmoid",
            )),
        }
    }
}

/// Hyperparameters of one classifier
///
/// Only the settings meaningful for the family are carried, so a logistic
/// model never records a kernel and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model_type", rename_all = "lowercase")]
pub enum Hyperparameters {
    Logistic {
        #[serde(rename = "C")]
        c: f64,
        solver: LogisticSolver,
        max_iter: usize,
    },
    Svm {
        #[serde(rename = "C")]
        c: f64,
        kernel: SvmKernel,
    },
}

impl Hyperparameters {
    /// Logistic regression with the default solver
    pub fn logistic(c: f64) -> Self {
        Hyperparameters::Logistic {
            c,
            solver: LogisticSolver::Lbfgs,
            max_iter: 200,
        }
    }

    /// Support vector classifier with the RBF kernel
    pub fn svm(c: f64) -> Self {
        Hyperparameters::Svm {
            c,
            kernel: SvmKernel::Rbf,
        }
    }

    /// Replace the solver; ignored for SVM
    pub fn with_solver(mut self, new_solver: LogisticSolver) -> Self {
        if let Hyperparameters::Logistic { solver, .. } = &mut self {
            *solver = new_solver;
        }
        self
    }

    /// Replace the iteration cap; ignored for SVM
    pub fn with_max_iter(mut self, new_max_iter: usize) -> Self {
        if let Hyperparameters::Logistic { max_iter, .. } = &mut self {
            *max_iter = new_max_iter;
        }
        self
    }

    /// Replace the kernel; ignored for logistic regression
    pub fn with_kernel(mut self, new_kernel: SvmKernel) -> Self {
        if let Hyperparameters::Svm { kernel, .. } = &mut self {
            *kernel = new_kernel;
        }
        self
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            Hyperparameters::Logistic { .. } => ModelFamily::Logistic,
            Hyperparameters::Svm { .. } => ModelFamily::Svm,
        }
    }

    /// Inverse regularization strength
    pub fn c(&self) -> f64 {
        match self {
            Hyperparameters::Logistic { c, .. } | Hyperparameters::Svm { c, .. } => *c,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let c = self.c();
        if !c.is_finite() || c <= 0.0 {
            return Err(IrisError::invalid_parameter("C", c, "must be a positive number"));
        }
        if let Hyperparameters::Logistic { max_iter, .. } = self {
            if *max_iter == 0 {
                return Err(IrisError::invalid_parameter(
                    "max_iter",
                    max_iter,
                    "must be at least 1",
                ));
            }
        }
        Ok(())
    }

    /// Parameters as recorded on a tracking run
    pub fn tracking_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("model_type", self.family().as_str().to_string()),
            ("C", format!("{:?}", self.c())),
        ];
        match self {
            Hyperparameters::Logistic {
                solver, max_iter, ..
            } => {
                params.push(("solver", solver.to_string()));
                params.push(("max_iter", max_iter.to_string()));
            }
            Hyperparameters::Svm { kernel, .. } => {
                params.push(("kernel", kernel.to_string()));
            }
        }
        params
    }

    /// Run name such as `LogisticRegression_C=1.0`
    pub fn run_name(&self) -> String {
        format!("{}_C={:?}", self.family().display_name(), self.c())
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hyperparameters::Logistic {
                c,
                solver,
                max_iter,
            } => write!(f, "logistic(C={:?}, solver={}, max_iter={})", c, solver, max_iter),
            Hyperparameters::Svm { c, kernel } => write!(f, "svm(C={:?}, kernel={})", c, kernel),
        }
    }
}

/// Configuration of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub data_path: PathBuf,
    pub artifacts_dir: PathBuf,
    /// Model file name inside `artifacts_dir`
    pub model_file: String,
    pub hyperparameters: Hyperparameters,
    pub test_size: f64,
    pub random_state: u64,
    pub experiment_name: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            model_file: "model.pkl".to_string(),
            hyperparameters: Hyperparameters::logistic(1.0),
            test_size: DEFAULT_TEST_SIZE,
            random_state: DEFAULT_RANDOM_STATE,
            experiment_name: DEFAULT_EXPERIMENT.to_string(),
        }
    }
}

impl TrainingConfig {
    pub fn new(hyperparameters: Hyperparameters) -> Self {
        Self {
            hyperparameters,
            ..Default::default()
        }
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    /// Write the model as `model_{tag}.pkl` so the server can pick it by version
    pub fn with_version(mut self, tag: &str) -> Self {
        self.model_file = format!("model_{}.pkl", tag);
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_experiment(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = name.into();
        self
    }

    pub fn model_path(&self) -> PathBuf {
        self.artifacts_dir.join(&self.model_file)
    }

    pub fn confusion_matrix_path(&self) -> PathBuf {
        self.artifacts_dir.join("confusion_matrix.png")
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(IrisError::invalid_parameter(
                "test_size",
                self.test_size,
                "must be in (0, 1)",
            ));
        }
        self.hyperparameters.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("logistic".parse::<ModelFamily>().unwrap(), ModelFamily::Logistic);
        assert_eq!("SVM".parse::<ModelFamily>().unwrap(), ModelFamily::Svm);
        assert!("tree".parse::<ModelFamily>().is_err());

        assert_eq!("newton-cg".parse::<LogisticSolver>().unwrap(), LogisticSolver::NewtonCg);
        assert!("sag".parse::<LogisticSolver>().is_err());
        assert_eq!("poly".parse::<SvmKernel>().unwrap(), SvmKernel::Poly);
    }

    #[test]
    fn test_run_name_keeps_decimal() {
        assert_eq!(Hyperparameters::logistic(1.0).run_name(), "LogisticRegression_C=1.0");
        assert_eq!(Hyperparameters::svm(0.5).run_name(), "SVM_C=0.5");
    }

    #[test]
    fn test_validate_rejects_bad_c() {
        assert!(Hyperparameters::logistic(0.0).validate().is_err());
        assert!(Hyperparameters::svm(-1.0).validate().is_err());
        assert!(Hyperparameters::svm(f64::NAN).validate().is_err());
        assert!(Hyperparameters::logistic(1.0).with_max_iter(0).validate().is_err());
        assert!(Hyperparameters::logistic(1e-3).validate().is_ok());
    }

    #[test]
    fn test_builders_respect_family() {
        let svm = Hyperparameters::svm(1.0).with_solver(LogisticSolver::Liblinear);
        assert_eq!(svm, Hyperparameters::svm(1.0));

        let lr = Hyperparameters::logistic(1.0).with_kernel(SvmKernel::Poly);
        assert_eq!(lr, Hyperparameters::logistic(1.0));
    }

    #[test]
    fn test_tracking_params() {
        let params = Hyperparameters::svm(2.0).with_kernel(SvmKernel::Linear).tracking_params();
        let keys: Vec<&str> = params.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["model_type", "C", "kernel"]);
        assert_eq!(params[2].1, "linear");
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(Hyperparameters::logistic(1.0)).unwrap();
        assert_eq!(json["model_type"], "logistic");
        assert_eq!(json["C"], 1.0);
        assert_eq!(json["solver"], "lbfgs");
    }

    #[test]
    fn test_version_model_path() {
        let config = TrainingConfig::default().with_version("v2");
        assert_eq!(config.model_path(), PathBuf::from("artifacts/model_v2.pkl"));
        assert!(config.validate().is_ok());
        assert!(config.with_test_size(1.0).validate().is_err());
    }
}
