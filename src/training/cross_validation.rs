//! Cross-validation

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::Hyperparameters;
use super::metrics::accuracy;
use super::model::Classifier;
use crate::error::{IrisError, Result};

/// Cross-validation strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold {
            n_splits: 5,
            shuffle: false,
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl Default for CrossValidator {
    fn default() -> Self {
        Self::new(CVStrategy::default())
    }
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Stratified k-fold without shuffling
    pub fn stratified(n_splits: usize) -> Self {
        Self::new(CVStrategy::StratifiedKFold {
            n_splits,
            shuffle: false,
        })
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_splits(&self) -> usize {
        match self.strategy {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::StratifiedKFold { n_splits, .. } => {
                n_splits
            }
        }
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize, y: Option<&Array1<usize>>) -> Result<Vec<CVSplit>> {
        let n_splits = self.n_splits();
        if n_splits < 2 {
            return Err(IrisError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }
        if n_samples < n_splits {
            return Err(IrisError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        match &self.strategy {
            CVStrategy::KFold { shuffle, .. } => Ok(self.k_fold_split(n_samples, n_splits, *shuffle)),
            CVStrategy::StratifiedKFold { shuffle, .. } => {
                let y = y.ok_or_else(|| {
                    IrisError::ValidationError("StratifiedKFold requires target array".to_string())
                })?;
                if y.len() != n_samples {
                    return Err(IrisError::ShapeError {
                        expected: format!("{} labels", n_samples),
                        actual: format!("{} labels", y.len()),
                    });
                }
                Ok(self.stratified_k_fold_split(y, n_splits, *shuffle))
            }
        }
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Vec<CVSplit> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;

        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            current += fold_size;
        }
        splits
    }

    fn stratified_k_fold_split(
        &self,
        y: &Array1<usize>,
        n_splits: usize,
        shuffle: bool,
    ) -> Vec<CVSplit> {
        let mut class_indices: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, &class) in y.iter().enumerate() {
            class_indices.entry(class).or_default().push(idx);
        }

        if shuffle {
            let mut rng = self.rng();
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Deal each class round-robin so every fold sees every class
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut offset = 0;
        for indices in class_indices.values() {
            for (i, &idx) in indices.iter().enumerate() {
                folds[(offset + i) % n_splits].push(idx);
            }
            offset += indices.len();
        }
        for fold in folds.iter_mut() {
            fold.sort_unstable();
        }

        (0..n_splits)
            .map(|fold_idx| {
                let train_indices = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                CVSplit {
                    train_indices,
                    test_indices: folds[fold_idx].clone(),
                    fold_idx,
                }
            })
            .collect()
    }
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    pub n_folds: usize,
}

impl CVResults {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let mean_score = scores.iter().sum::<f64>() / n_folds.max(1) as f64;
        let variance = scores
            .iter()
            .map(|s| (s - mean_score).powi(2))
            .sum::<f64>()
            / n_folds.max(1) as f64;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

/// Mean fold accuracy of a freshly fitted classifier per fold.
pub fn cross_val_score(
    hyperparameters: &Hyperparameters,
    x: &Array2<f64>,
    y: &Array1<usize>,
    cv: &CrossValidator,
    seed: u64,
) -> Result<CVResults> {
    let splits = cv.split(x.nrows(), Some(y))?;
    let mut scores = Vec::with_capacity(splits.len());

    for split in &splits {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let mut model = Classifier::from_hyperparameters(hyperparameters, seed)?;
        model.fit(&x_train, &y_train)?;
        let score = accuracy(&y_test, &model.predict(&x_test)?)?;
        debug!(fold = split.fold_idx, score, "Fold scored");
        scores.push(score);
    }

    Ok(CVResults::from_scores(scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold {
            n_splits: 5,
            shuffle: false,
        });
        let splits = cv.split(100, None).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_stratified_k_fold() {
        let y = Array1::from_vec(vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1]);

        let cv = CrossValidator::stratified(5);
        let splits = cv.split(10, Some(&y)).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 2);
            let classes: Vec<usize> = split.test_indices.iter().map(|&i| y[i]).collect();
            assert!(classes.contains(&0) && classes.contains(&1));
        }
    }

    #[test]
    fn test_stratified_is_deterministic() {
        let y = Dataset::iris().targets;
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: 5,
            shuffle: true,
        })
        .with_random_state(7);
        let a = cv.split(150, Some(&y)).unwrap();
        let b = cv.split(150, Some(&y)).unwrap();
        for (sa, sb) in a.iter().zip(b.iter()) {
            assert_eq!(sa.test_indices, sb.test_indices);
        }
    }

    #[test]
    fn test_stratified_requires_targets() {
        let cv = CrossValidator::stratified(3);
        assert!(cv.split(10, None).is_err());
        assert!(CrossValidator::stratified(1).split(10, None).is_err());
    }

    #[test]
    fn test_cross_val_score_iris() {
        let ds = Dataset::iris();
        let results = cross_val_score(
            &Hyperparameters::logistic(1.0),
            &ds.features,
            &ds.targets,
            &CrossValidator::stratified(5),
            42,
        )
        .unwrap();

        assert_eq!(results.n_folds, 5);
        assert!(results.mean_score > 0.9, "mean {}", results.mean_score);
        assert!(results.scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }
}
