//! Smooth unconstrained minimizers used by the logistic solvers

use std::collections::VecDeque;

use ndarray::Array1;

/// History length kept by L-BFGS
const LBFGS_MEMORY: usize = 10;

/// Sufficient decrease constant for the Armijo condition
const ARMIJO_C1: f64 = 1e-4;

const MAX_LINE_SEARCH_STEPS: usize = 40;

/// Outcome of a minimization
#[derive(Debug, Clone)]
pub(crate) struct OptimResult {
    pub x: Array1<f64>,
    pub loss: f64,
    pub iterations: usize,
    pub converged: bool,
}

fn max_abs(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0_f64, |m, x| m.max(x.abs()))
}

/// Backtracking line search along `direction`, halving the step until the
/// Armijo condition holds.
fn backtrack<F>(
    objective: &mut F,
    x: &Array1<f64>,
    loss: f64,
    direction: &Array1<f64>,
    slope: f64,
) -> Option<(Array1<f64>, f64, Array1<f64>)>
where
    F: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
{
    let mut step = 1.0;
    for _ in 0..MAX_LINE_SEARCH_STEPS {
        let candidate = x + &(direction * step);
        let (f_new, g_new) = objective(&candidate);
        if f_new.is_finite() && f_new <= loss + ARMIJO_C1 * step * slope {
            return Some((candidate, f_new, g_new));
        }
        step *= 0.5;
    }
    None
}

/// Limited-memory BFGS with the two-loop recursion.
///
/// `objective` returns the loss and its gradient. Stops when the largest
/// gradient component drops below `tol` or after `max_iter` iterations.
pub(crate) fn lbfgs<F>(mut objective: F, x0: Array1<f64>, max_iter: usize, tol: f64) -> OptimResult
where
    F: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
{
    let mut x = x0;
    let (mut loss, mut grad) = objective(&x);
    let mut s_hist: VecDeque<Array1<f64>> = VecDeque::with_capacity(LBFGS_MEMORY);
    let mut y_hist: VecDeque<Array1<f64>> = VecDeque::with_capacity(LBFGS_MEMORY);
    let mut rho_hist: VecDeque<f64> = VecDeque::with_capacity(LBFGS_MEMORY);

    let mut iterations = 0;
    let mut converged = max_abs(&grad) < tol;

    while !converged && iterations < max_iter {
        let k = s_hist.len();
        let mut q = grad.clone();
        let mut alpha = vec![0.0; k];
        for i in (0..k).rev() {
            alpha[i] = rho_hist[i] * s_hist[i].dot(&q);
            q.scaled_add(-alpha[i], &y_hist[i]);
        }

        let gamma = match (s_hist.back(), y_hist.back()) {
            (Some(s), Some(y)) => s.dot(y) / y.dot(y),
            _ => 1.0 / grad.dot(&grad).sqrt().max(1.0),
        };
        let mut r = q * gamma;
        for i in 0..k {
            let beta = rho_hist[i] * y_hist[i].dot(&r);
            r.scaled_add(alpha[i] - beta, &s_hist[i]);
        }

        let mut direction = -r;
        let mut slope = grad.dot(&direction);
        if !(slope < 0.0) {
            // Curvature history went stale; restart from steepest descent
            s_hist.clear();
            y_hist.clear();
            rho_hist.clear();
            direction = -&grad;
            slope = -grad.dot(&grad);
        }

        let Some((x_new, loss_new, grad_new)) =
            backtrack(&mut objective, &x, loss, &direction, slope)
        else {
            break;
        };

        let s = &x_new - &x;
        let y = &grad_new - &grad;
        let sy = s.dot(&y);
        if sy > 1e-10 {
            if s_hist.len() == LBFGS_MEMORY {
                s_hist.pop_front();
                y_hist.pop_front();
                rho_hist.pop_front();
            }
            s_hist.push_back(s);
            y_hist.push_back(y);
            rho_hist.push_back(1.0 / sy);
        }

        let previous = loss;
        x = x_new;
        loss = loss_new;
        grad = grad_new;
        iterations += 1;

        converged = max_abs(&grad) < tol
            || (previous - loss).abs() <= f64::EPSILON * previous.abs().max(loss.abs()).max(1.0);
    }

    OptimResult {
        x,
        loss,
        iterations,
        converged,
    }
}

/// Truncated Newton method with an inner conjugate gradient solve.
///
/// `hessp(x, v)` returns the Hessian at `x` applied to `v`.
pub(crate) fn newton_cg<F, H>(
    mut objective: F,
    mut hessp: H,
    x0: Array1<f64>,
    max_iter: usize,
    tol: f64,
) -> OptimResult
where
    F: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
    H: FnMut(&Array1<f64>, &Array1<f64>) -> Array1<f64>,
{
    let dim = x0.len();
    let mut x = x0;
    let (mut loss, mut grad) = objective(&x);
    let mut iterations = 0;
    let mut converged = max_abs(&grad) < tol;

    while !converged && iterations < max_iter {
        let direction = conjugate_gradient(&mut hessp, &x, &grad, dim * 10);
        let slope = grad.dot(&direction);
        let (direction, slope) = if slope < 0.0 {
            (direction, slope)
        } else {
            (-&grad, -grad.dot(&grad))
        };

        let Some((x_new, loss_new, grad_new)) =
            backtrack(&mut objective, &x, loss, &direction, slope)
        else {
            break;
        };

        let previous = loss;
        x = x_new;
        loss = loss_new;
        grad = grad_new;
        iterations += 1;

        converged = max_abs(&grad) < tol
            || (previous - loss).abs() <= f64::EPSILON * previous.abs().max(loss.abs()).max(1.0);
    }

    OptimResult {
        x,
        loss,
        iterations,
        converged,
    }
}

/// Approximately solve `H p = -g`, stopping on negative curvature.
fn conjugate_gradient<H>(
    hessp: &mut H,
    x: &Array1<f64>,
    grad: &Array1<f64>,
    max_iter: usize,
) -> Array1<f64>
where
    H: FnMut(&Array1<f64>, &Array1<f64>) -> Array1<f64>,
{
    let grad_norm = grad.dot(grad).sqrt();
    let tolerance = grad_norm.sqrt().min(0.5) * grad_norm;

    let mut p = Array1::zeros(grad.len());
    let mut residual = -grad;
    let mut search = residual.clone();
    let mut rr = residual.dot(&residual);

    for i in 0..max_iter {
        if rr.sqrt() <= tolerance {
            break;
        }
        let hs = hessp(x, &search);
        let curvature = search.dot(&hs);
        if curvature <= 0.0 {
            if i == 0 {
                return -grad;
            }
            break;
        }
        let step = rr / curvature;
        p.scaled_add(step, &search);
        residual.scaled_add(-step, &hs);
        let rr_new = residual.dot(&residual);
        search = &residual + &(search * (rr_new / rr));
        rr = rr_new;
    }

    p
}
