//! Classification metrics

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{IrisError, Result};

fn check_lengths(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(IrisError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    if y_true.is_empty() {
        return Err(IrisError::ValidationError(
            "cannot score an empty prediction set".to_string(),
        ));
    }
    Ok(())
}

/// Fraction of exact label matches
pub fn accuracy(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    Ok(correct as f64 / y_true.len() as f64)
}

/// Counts of (true, predicted) label pairs.
///
/// Rows are true classes and columns predicted classes, both in class-id
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: Array2<usize>,
    pub labels: Vec<String>,
}

impl ConfusionMatrix {
    pub fn compute(
        y_true: &Array1<usize>,
        y_pred: &Array1<usize>,
        labels: &[&str],
    ) -> Result<Self> {
        check_lengths(y_true, y_pred)?;
        let k = labels.len();
        let mut counts = Array2::zeros((k, k));
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            if t >= k || p >= k {
                return Err(IrisError::UnknownClass(t.max(p) as i64));
            }
            counts[[t, p]] += 1;
        }
        Ok(Self {
            counts,
            labels: labels.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn n_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    /// Largest single cell, used to scale colors
    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.counts.diag().sum() as f64 / total as f64
    }
}
