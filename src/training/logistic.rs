//! L2-regularized logistic regression
//!
//! `lbfgs` and `newton-cg` minimize the multinomial cross-entropy over all
//! classes jointly with an unpenalized intercept. `liblinear` fits one
//! binary model per class (one-vs-rest) and penalizes the intercept like
//! any other weight.
//!
//! The objective is the mean loss plus `||w||^2 / (2 C n)`, so larger `C`
//! means weaker regularization.

use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::LogisticSolver;
use super::optim::{lbfgs, newton_cg, OptimResult};
use crate::error::{IrisError, Result};

/// Logistic regression classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    pub solver: LogisticSolver,
    pub max_iter: usize,
    /// Gradient tolerance
    pub tol: f64,
    /// One row per class (multinomial, one-vs-rest) or a single row (binary)
    pub coefficients: Option<Array2<f64>>,
    pub intercepts: Option<Array1<f64>>,
    /// Sorted distinct labels seen during fit
    pub classes: Vec<usize>,
    /// Iterations used by the slowest sub-problem
    pub n_iter: usize,
    pub converged: bool,
    pub is_fitted: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl LogisticRegression {
    pub fn new(c: f64) -> Self {
        Self {
            c,
            solver: LogisticSolver::Lbfgs,
            max_iter: 100,
            tol: 1e-4,
            coefficients: None,
            intercepts: None,
            classes: Vec::new(),
            n_iter: 0,
            converged: false,
            is_fitted: false,
        }
    }

    pub fn with_solver(mut self, solver: LogisticSolver) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Fit the model
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<&mut Self> {
        if !self.c.is_finite() || self.c <= 0.0 {
            return Err(IrisError::invalid_parameter("C", self.c, "must be a positive number"));
        }
        if self.max_iter == 0 {
            return Err(IrisError::invalid_parameter("max_iter", 0, "must be at least 1"));
        }
        validate_inputs(x, y)?;

        let mut classes: Vec<usize> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(IrisError::TrainingError(
                "logistic regression needs at least 2 distinct classes".to_string(),
            ));
        }
        let encoded: Array1<usize> = y.mapv(|v| classes.partition_point(|&c| c < v));
        let lambda = 1.0 / (self.c * x.nrows() as f64);

        let (coefficients, intercepts, n_iter, converged) = match self.solver {
            LogisticSolver::Lbfgs | LogisticSolver::NewtonCg => {
                let problem = Multinomial {
                    x,
                    y: &encoded,
                    n_classes: classes.len(),
                    lambda,
                };
                let result = self.minimize(&problem);
                let (w, b) = problem.unpack(result.x.view());
                (w, b, result.iterations, result.converged)
            }
            LogisticSolver::Liblinear => {
                let positives: Vec<usize> = if classes.len() == 2 {
                    vec![1]
                } else {
                    (0..classes.len()).collect()
                };
                let d = x.ncols();
                let mut w = Array2::zeros((positives.len(), d));
                let mut b = Array1::zeros(positives.len());
                let mut n_iter = 0;
                let mut converged = true;

                for (row, &positive) in positives.iter().enumerate() {
                    let signs = encoded.mapv(|v| if v == positive { 1.0 } else { -1.0 });
                    let problem = Binary {
                        x,
                        t: &signs,
                        lambda,
                    };
                    let result = self.minimize(&problem);
                    w.row_mut(row).assign(&result.x.slice(s![..d]));
                    b[row] = result.x[d];
                    n_iter = n_iter.max(result.iterations);
                    converged &= result.converged;
                }
                (w, b, n_iter, converged)
            }
        };

        if !converged {
            warn!(
                solver = %self.solver,
                max_iter = self.max_iter,
                "Logistic regression did not converge; consider raising max_iter"
            );
        }
        debug!(solver = %self.solver, n_iter, converged, "Logistic regression fitted");

        self.coefficients = Some(coefficients);
        self.intercepts = Some(intercepts);
        self.classes = classes;
        self.n_iter = n_iter;
        self.converged = converged;
        self.is_fitted = true;
        Ok(self)
    }

    fn minimize<P: Objective>(&self, problem: &P) -> OptimResult {
        let x0 = Array1::zeros(problem.dim());
        match self.solver {
            LogisticSolver::Lbfgs => lbfgs(|t| problem.loss_grad(t), x0, self.max_iter, self.tol),
            LogisticSolver::NewtonCg | LogisticSolver::Liblinear => newton_cg(
                |t| problem.loss_grad(t),
                |t, v| problem.hessp(t, v),
                x0,
                self.max_iter,
                self.tol,
            ),
        }
    }

    fn params(&self) -> Result<(&Array2<f64>, &Array1<f64>)> {
        match (&self.coefficients, &self.intercepts) {
            (Some(w), Some(b)) if self.is_fitted => Ok((w, b)),
            _ => Err(IrisError::ModelNotFitted),
        }
    }

    fn check_features(&self, x: &Array2<f64>) -> Result<()> {
        let (w, _) = self.params()?;
        if x.ncols() != w.ncols() {
            return Err(IrisError::ShapeError {
                expected: format!("{} features", w.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }

    /// Raw scores, one column per coefficient row
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_features(x)?;
        let (w, b) = self.params()?;
        Ok(x.dot(&w.t()) + b)
    }

    /// Class probabilities, one column per class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let scores = self.decision_function(x)?;

        if scores.ncols() == 1 {
            let mut proba = Array2::zeros((scores.nrows(), 2));
            for (i, &z) in scores.column(0).iter().enumerate() {
                let p1 = sigmoid(z);
                proba[[i, 0]] = 1.0 - p1;
                proba[[i, 1]] = p1;
            }
            return Ok(proba);
        }

        let mut proba = scores;
        if self.solver == LogisticSolver::Liblinear {
            proba.mapv_inplace(sigmoid);
            for mut row in proba.rows_mut() {
                let total = row.sum();
                if total > 0.0 {
                    row /= total;
                }
            }
        } else {
            for mut row in proba.rows_mut() {
                softmax_in_place(&mut row);
            }
        }
        Ok(proba)
    }

    /// Predicted labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let scores = self.decision_function(x)?;
        if scores.ncols() == 1 {
            return Ok(scores
                .column(0)
                .mapv(|z| if z > 0.0 { self.classes[1] } else { self.classes[0] }));
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

pub(crate) fn validate_inputs(x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(IrisError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(IrisError::DataError("cannot fit on an empty dataset".to_string()));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(IrisError::DataError("features contain NaN or infinite values".to_string()));
    }
    Ok(())
}

/// Index of the largest value, first one on ties
pub(crate) fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^u)` without overflow
fn softplus(u: f64) -> f64 {
    if u > 0.0 {
        u + (-u).exp().ln_1p()
    } else {
        u.exp().ln_1p()
    }
}

fn softmax_in_place(row: &mut ndarray::ArrayViewMut1<f64>) {
    let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    row.mapv_inplace(|v| (v - max).exp());
    let total = row.sum();
    *row /= total;
}

trait Objective {
    fn dim(&self) -> usize;
    fn loss_grad(&self, theta: &Array1<f64>) -> (f64, Array1<f64>);
    fn hessp(&self, theta: &Array1<f64>, v: &Array1<f64>) -> Array1<f64>;
}

/// Softmax cross-entropy over `n_classes` with packed parameters
/// `[W (row-major, n_classes x d), b (n_classes)]`.
struct Multinomial<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<usize>,
    n_classes: usize,
    lambda: f64,
}

impl Multinomial<'_> {
    fn unpack(&self, theta: ArrayView1<f64>) -> (Array2<f64>, Array1<f64>) {
        let (k, d) = (self.n_classes, self.x.ncols());
        let w = Array2::from_shape_fn((k, d), |(c, j)| theta[c * d + j]);
        let b = theta.slice(s![k * d..]).to_owned();
        (w, b)
    }

    fn pack(w: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
        w.iter().chain(b.iter()).copied().collect()
    }

    /// Row-wise softmax probabilities and the summed log-likelihood
    fn probabilities(&self, w: &Array2<f64>, b: &Array1<f64>) -> (Array2<f64>, f64) {
        let mut proba = self.x.dot(&w.t()) + b;
        let mut log_likelihood = 0.0;
        for (mut row, &label) in proba.rows_mut().into_iter().zip(self.y.iter()) {
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            let log_sum = max + row.iter().map(|v| (v - max).exp()).sum::<f64>().ln();
            log_likelihood += row[label] - log_sum;
            row.mapv_inplace(|v| (v - log_sum).exp());
        }
        (proba, log_likelihood)
    }
}

impl Objective for Multinomial<'_> {
    fn dim(&self) -> usize {
        self.n_classes * (self.x.ncols() + 1)
    }

    fn loss_grad(&self, theta: &Array1<f64>) -> (f64, Array1<f64>) {
        let n = self.x.nrows() as f64;
        let (w, b) = self.unpack(theta.view());
        let (mut residual, log_likelihood) = self.probabilities(&w, &b);

        let loss = -log_likelihood / n + 0.5 * self.lambda * w.iter().map(|v| v * v).sum::<f64>();

        for (mut row, &label) in residual.rows_mut().into_iter().zip(self.y.iter()) {
            row[label] -= 1.0;
        }
        let grad_w = residual.t().dot(self.x) / n + &w * self.lambda;
        let grad_b = residual.sum_axis(Axis(0)) / n;
        (loss, Self::pack(&grad_w, &grad_b))
    }

    fn hessp(&self, theta: &Array1<f64>, v: &Array1<f64>) -> Array1<f64> {
        let n = self.x.nrows() as f64;
        let (w, b) = self.unpack(theta.view());
        let (proba, _) = self.probabilities(&w, &b);
        let (vw, vb) = self.unpack(v.view());

        let mut r = (self.x.dot(&vw.t()) + &vb) * &proba;
        for (mut r_row, p_row) in r.rows_mut().into_iter().zip(proba.rows()) {
            let total = r_row.sum();
            r_row.scaled_add(-total, &p_row);
        }

        let hv_w = r.t().dot(self.x) / n + &vw * self.lambda;
        let hv_b = r.sum_axis(Axis(0)) / n;
        Self::pack(&hv_w, &hv_b)
    }
}

/// Binary logistic loss on labels in {-1, +1} with packed parameters
/// `[w (d), b]`. The intercept is penalized.
struct Binary<'a> {
    x: &'a Array2<f64>,
    t: &'a Array1<f64>,
    lambda: f64,
}

impl Binary<'_> {
    fn margins(&self, theta: &Array1<f64>) -> Array1<f64> {
        let d = self.x.ncols();
        self.x.dot(&theta.slice(s![..d])) + theta[d]
    }
}

impl Objective for Binary<'_> {
    fn dim(&self) -> usize {
        self.x.ncols() + 1
    }

    fn loss_grad(&self, theta: &Array1<f64>) -> (f64, Array1<f64>) {
        let n = self.x.nrows() as f64;
        let d = self.x.ncols();
        let z = self.margins(theta);

        let data_loss: f64 = z
            .iter()
            .zip(self.t.iter())
            .map(|(&zi, &ti)| softplus(-ti * zi))
            .sum();
        let loss = data_loss / n + 0.5 * self.lambda * theta.dot(theta);

        let dz: Array1<f64> = z
            .iter()
            .zip(self.t.iter())
            .map(|(&zi, &ti)| -ti * sigmoid(-ti * zi) / n)
            .collect();

        let mut grad = Array1::zeros(d + 1);
        grad.slice_mut(s![..d]).assign(&self.x.t().dot(&dz));
        grad[d] = dz.sum();
        grad.scaled_add(self.lambda, theta);
        (loss, grad)
    }

    fn hessp(&self, theta: &Array1<f64>, v: &Array1<f64>) -> Array1<f64> {
        let n = self.x.nrows() as f64;
        let d = self.x.ncols();
        let z = self.margins(theta);

        let xv = self.x.dot(&v.slice(s![..d])) + v[d];
        let u: Array1<f64> = z
            .iter()
            .zip(xv.iter())
            .map(|(&zi, &xvi)| {
                let p = sigmoid(zi);
                p * (1.0 - p) * xvi / n
            })
            .collect();

        let mut hv = Array1::zeros(d + 1);
        hv.slice_mut(s![..d]).assign(&self.x.t().dot(&u));
        hv[d] = u.sum();
        hv.scaled_add(self.lambda, v);
        hv
    }
}
