//! Support vector classifier
//!
//! Binary machines are trained with SMO (Sequential Minimal Optimization).
//! More than two classes are handled one-vs-rest.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::SvmKernel;
use super::logistic::{argmax, validate_inputs};
use crate::error::{IrisError, Result};

/// Maximum number of samples for eager kernel matrix computation
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Below this size the kernel matrix is filled sequentially
const PARALLEL_KERNEL_THRESHOLD: usize = 100;

/// Kernel function with its resolved coefficients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelType {
    /// Linear kernel: K(x, y) = x · y
    Linear,
    /// Polynomial kernel: K(x, y) = (γ * x · y + r)^d
    Polynomial { degree: u32, gamma: f64, coef0: f64 },
    /// Radial Basis Function (Gaussian): K(x, y) = exp(-γ * ||x - y||²)
    RBF { gamma: f64 },
    /// Sigmoid kernel: K(x, y) = tanh(γ * x · y + r)
    Sigmoid { gamma: f64, coef0: f64 },
}

impl KernelType {
    /// Evaluate the kernel on two rows
    pub fn compute(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            KernelType::Linear => a.dot(&b),
            KernelType::Polynomial {
                degree,
                gamma,
                coef0,
            } => (gamma * a.dot(&b) + coef0).powi(*degree as i32),
            KernelType::RBF { gamma } => {
                let norm_sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * norm_sq).exp()
            }
            KernelType::Sigmoid { gamma, coef0 } => (gamma * a.dot(&b) + coef0).tanh(),
        }
    }
}

/// Kernel width selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gamma {
    /// `1 / (n_features * var(X))`, computed on the training data
    Scale,
    Value(f64),
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    pub kernel: SvmKernel,
    pub gamma: Gamma,
    /// Polynomial degree
    pub degree: u32,
    /// Independent term for polynomial and sigmoid kernels
    pub coef0: f64,
    /// Tolerance for the KKT check
    pub tol: f64,
    /// Maximum number of passes over the data
    pub max_iter: usize,
    pub random_state: Option<u64>,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: SvmKernel::Rbf,
            gamma: Gamma::Scale,
            degree: 3,
            coef0: 0.0,
            tol: 1e-3,
            max_iter: 1000,
            random_state: Some(42),
        }
    }
}

impl SVMConfig {
    pub fn new(c: f64, kernel: SvmKernel) -> Self {
        Self {
            c,
            kernel,
            ..Default::default()
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn resolve_kernel(&self, x: &Array2<f64>) -> KernelType {
        let gamma = match self.gamma {
            Gamma::Value(g) => g,
            Gamma::Scale => {
                let n = x.len() as f64;
                let mean = x.sum() / n;
                let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                if var > 0.0 {
                    1.0 / (x.ncols() as f64 * var)
                } else {
                    1.0
                }
            }
        };
        match self.kernel {
            SvmKernel::Linear => KernelType::Linear,
            SvmKernel::Rbf => KernelType::RBF { gamma },
            SvmKernel::Poly => KernelType::Polynomial {
                degree: self.degree,
                gamma,
                coef0: self.coef0,
            },
            SvmKernel::Sigmoid => KernelType::Sigmoid {
                gamma,
                coef0: self.coef0,
            },
        }
    }
}

/// A binary SVM separating one class (+1) from the rest (-1)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySVM {
    support_vectors: Array2<f64>,
    /// Alpha times label for each support vector
    dual_coef: Array1<f64>,
    bias: f64,
}

impl BinarySVM {
    fn decision(&self, kernel: &KernelType, x: ArrayView1<f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.dual_coef.iter())
            .map(|(sv, &coef)| coef * kernel.compute(sv, x))
            .sum::<f64>()
            + self.bias
    }
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    /// Kernel resolved against the training data
    kernel: Option<KernelType>,
    /// Sorted distinct labels seen during fit
    classes: Vec<usize>,
    /// One machine for two classes, one per class otherwise
    machines: Vec<BinarySVM>,
    n_features: usize,
    is_fitted: bool,
}

impl SVMClassifier {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            kernel: None,
            classes: Vec::new(),
            machines: Vec::new(),
            n_features: 0,
            is_fitted: false,
        }
    }

    pub fn config(&self) -> &SVMConfig {
        &self.config
    }

    pub fn kernel(&self) -> Option<&KernelType> {
        self.kernel.as_ref()
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Total support vectors across machines
    pub fn n_support(&self) -> usize {
        self.machines.iter().map(|m| m.dual_coef.len()).sum()
    }

    /// Fit the classifier
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        if !self.config.c.is_finite() || self.config.c <= 0.0 {
            return Err(IrisError::invalid_parameter(
                "C",
                self.config.c,
                "must be a positive number",
            ));
        }
        validate_inputs(x, y)?;
        if x.nrows() > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(IrisError::DataError(format!(
                "{} samples exceed the kernel matrix limit of {}",
                x.nrows(),
                MAX_KERNEL_MATRIX_SAMPLES
            )));
        }

        let mut classes: Vec<usize> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(IrisError::TrainingError(
                "SVM requires at least 2 distinct classes".to_string(),
            ));
        }

        let kernel = self.config.resolve_kernel(x);
        let kernel_matrix = compute_kernel_matrix(&kernel, x);

        let positives: Vec<usize> = if classes.len() == 2 {
            vec![classes[1]]
        } else {
            classes.clone()
        };

        let mut machines = Vec::with_capacity(positives.len());
        for &positive in &positives {
            let y_binary: Array1<f64> = y.mapv(|v| if v == positive { 1.0 } else { -1.0 });
            let (alphas, bias) = self.smo_train(&kernel_matrix, &y_binary);

            let support: Vec<usize> = alphas
                .iter()
                .enumerate()
                .filter(|(_, &a)| a > 1e-8)
                .map(|(i, _)| i)
                .collect();

            machines.push(BinarySVM {
                support_vectors: x.select(Axis(0), &support),
                dual_coef: support.iter().map(|&i| alphas[i] * y_binary[i]).collect(),
                bias,
            });
        }

        debug!(
            kernel = ?kernel,
            machines = machines.len(),
            support_vectors = machines.iter().map(|m| m.dual_coef.len()).sum::<usize>(),
            "SVM fitted"
        );

        self.kernel = Some(kernel);
        self.classes = classes;
        self.machines = machines;
        self.n_features = x.ncols();
        self.is_fitted = true;
        Ok(())
    }

    /// SMO training algorithm over a precomputed kernel matrix
    fn smo_train(&self, kernel_matrix: &Array2<f64>, y: &Array1<f64>) -> (Array1<f64>, f64) {
        let n = y.len();
        let c = self.config.c;
        let tol = self.config.tol;

        let mut alphas = Array1::zeros(n);
        let mut bias = 0.0;
        if n <= 1 {
            return (alphas, bias);
        }

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let mut passes = 0;
        let max_passes = 5;
        let mut total_iter = 0;

        while passes < max_passes && total_iter < self.config.max_iter {
            let mut num_changed = 0;

            for i in 0..n {
                let e_i = decision_cached(kernel_matrix, &alphas, y, bias, i) - y[i];

                // KKT violation check
                if (y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0) {
                    let j = loop {
                        let j = rng.gen_range(0..n);
                        if j != i {
                            break j;
                        }
                    };

                    let e_j = decision_cached(kernel_matrix, &alphas, y, bias, j) - y[j];

                    let alpha_i_old = alphas[i];
                    let alpha_j_old = alphas[j];

                    let (l, h) = if y[i] != y[j] {
                        ((alpha_j_old - alpha_i_old).max(0.0), (c + alpha_j_old - alpha_i_old).min(c))
                    } else {
                        ((alpha_i_old + alpha_j_old - c).max(0.0), (alpha_i_old + alpha_j_old).min(c))
                    };
                    if (l - h).abs() < 1e-10 {
                        continue;
                    }

                    let eta = 2.0 * kernel_matrix[[i, j]] - kernel_matrix[[i, i]] - kernel_matrix[[j, j]];
                    if eta >= 0.0 {
                        continue;
                    }

                    alphas[j] = (alpha_j_old - y[j] * (e_i - e_j) / eta).clamp(l, h);
                    if (alphas[j] - alpha_j_old).abs() < 1e-5 {
                        continue;
                    }
                    alphas[i] = alpha_i_old + y[i] * y[j] * (alpha_j_old - alphas[j]);

                    let b1 = bias
                        - e_i
                        - y[i] * (alphas[i] - alpha_i_old) * kernel_matrix[[i, i]]
                        - y[j] * (alphas[j] - alpha_j_old) * kernel_matrix[[i, j]];
                    let b2 = bias
                        - e_j
                        - y[i] * (alphas[i] - alpha_i_old) * kernel_matrix[[i, j]]
                        - y[j] * (alphas[j] - alpha_j_old) * kernel_matrix[[j, j]];

                    bias = if alphas[i] > 0.0 && alphas[i] < c {
                        b1
                    } else if alphas[j] > 0.0 && alphas[j] < c {
                        b2
                    } else {
                        (b1 + b2) / 2.0
                    };

                    num_changed += 1;
                }
            }

            total_iter += 1;
            if num_changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        (alphas, bias)
    }

    /// Per-machine decision values, one column per machine
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let kernel = match &self.kernel {
            Some(k) if self.is_fitted => k,
            _ => return Err(IrisError::ModelNotFitted),
        };
        if x.ncols() != self.n_features {
            return Err(IrisError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut scores = Array2::zeros((x.nrows(), self.machines.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (m, machine) in self.machines.iter().enumerate() {
                scores[[i, m]] = machine.decision(kernel, row);
            }
        }
        Ok(scores)
    }

    /// Predicted labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let scores = self.decision_function(x)?;
        if self.machines.len() == 1 {
            return Ok(scores
                .column(0)
                .mapv(|s| if s > 0.0 { self.classes[1] } else { self.classes[0] }));
        }
        Ok(scores
            .rows()
            .into_iter()
            .map(|row| self.classes[argmax(row)])
            .collect())
    }

    /// Mean accuracy
    pub fn score(&self, x: &Array2<f64>, y: &Array1<usize>) -> Result<f64> {
        super::metrics::accuracy(y, &self.predict(x)?)
    }
}

fn decision_cached(
    k: &Array2<f64>,
    alphas: &Array1<f64>,
    y: &Array1<f64>,
    bias: f64,
    idx: usize,
) -> f64 {
    alphas
        .iter()
        .zip(y.iter())
        .zip(k.column(idx).iter())
        .map(|((a, yi), kij)| a * yi * kij)
        .sum::<f64>()
        + bias
}

/// Compute the kernel matrix, in parallel for larger inputs
fn compute_kernel_matrix(kernel: &KernelType, x: &Array2<f64>) -> Array2<f64> {
    let n = x.nrows();
    let mut k = Array2::zeros((n, n));

    if n < PARALLEL_KERNEL_THRESHOLD {
        for i in 0..n {
            for j in i..n {
                let val = kernel.compute(x.row(i), x.row(j));
                k[[i, j]] = val;
                k[[j, i]] = val;
            }
        }
        return k;
    }

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| (i..n).map(|j| kernel.compute(x.row(i), x.row(j))).collect())
        .collect();

    for (i, row_vals) in rows.into_iter().enumerate() {
        for (offset, val) in row_vals.into_iter().enumerate() {
            let j = i + offset;
            k[[i, j]] = val;
            k[[j, i]] = val;
        }
    }
    k
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use ndarray::array;

    #[test]
    fn test_binary_linear() {
        let x = array![
            [1.0, 1.0],
            [1.5, 0.5],
            [0.5, 1.5],
            [5.0, 5.0],
            [5.5, 4.5],
            [4.5, 5.5]
        ];
        let y = array![3, 3, 3, 7, 7, 7];

        let mut svm = SVMClassifier::new(SVMConfig::new(1.0, SvmKernel::Linear));
        svm.fit(&x, &y).unwrap();

        assert_eq!(svm.classes(), &[3, 7]);
        assert_eq!(svm.predict(&x).unwrap(), y);
        assert!(svm.n_support() > 0);
    }

    #[test]
    fn test_iris_kernels() {
        let ds = Dataset::iris();
        for kernel in [SvmKernel::Linear, SvmKernel::Rbf, SvmKernel::Poly] {
            let mut svm = SVMClassifier::new(SVMConfig::new(1.0, kernel));
            svm.fit(&ds.features, &ds.targets).unwrap();
            let acc = svm.score(&ds.features, &ds.targets).unwrap();
            assert!(acc > 0.8, "kernel {} accuracy {}", kernel, acc);
        }
    }

    #[test]
    fn test_sigmoid_kernel_fits() {
        let ds = Dataset::iris();
        let mut svm = SVMClassifier::new(SVMConfig::new(1.0, SvmKernel::Sigmoid));
        svm.fit(&ds.features, &ds.targets).unwrap();
        let pred = svm.predict(&ds.features).unwrap();
        assert_eq!(pred.len(), 150);
        assert!(pred.iter().all(|p| *p < 3));
    }

    #[test]
    fn test_gamma_scale() {
        let x = array![[0.0, 0.0], [2.0, 2.0]];
        let config = SVMConfig::new(1.0, SvmKernel::Rbf);
        // var over all entries is 1.0, two features
        assert_eq!(config.resolve_kernel(&x), KernelType::RBF { gamma: 0.5 });
    }

    #[test]
    fn test_deterministic_with_seed() {
        let ds = Dataset::iris();
        let fit = || {
            let mut svm = SVMClassifier::new(SVMConfig::new(1.0, SvmKernel::Rbf).with_random_state(3));
            svm.fit(&ds.features, &ds.targets).unwrap();
            svm.decision_function(&ds.features).unwrap()
        };
        assert_eq!(fit(), fit());
    }

    #[test]
    fn test_kernel_matrix_parallel_matches_sequential() {
        let ds = Dataset::iris();
        let kernel = KernelType::RBF { gamma: 0.3 };
        let full = compute_kernel_matrix(&kernel, &ds.features);
        let small = ds.features.select(Axis(0), &(0..50).collect::<Vec<_>>());
        let part = compute_kernel_matrix(&kernel, &small);
        for i in 0..50 {
            for j in 0..50 {
                assert!((full[[i, j]] - part[[i, j]]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_not_fitted() {
        let svm = SVMClassifier::new(SVMConfig::default());
        assert!(matches!(
            svm.predict(&Array2::zeros((1, 4))),
            Err(IrisError::ModelNotFitted)
        ));
    }
}
